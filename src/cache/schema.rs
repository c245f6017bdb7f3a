// SPDX-License-Identifier: MPL-2.0

/// Bump to force every store to drop and rebuild on next open.
/// 3: visited flag no longer persisted.
pub const SCHEMA_VERSION: i64 = 3;

/// Drops everything the cache owns
pub const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS runestones;
DROP TABLE IF EXISTS cache_metadata;
"#;

/// SQL schema for the catalog mirror
pub const SCHEMA: &str = r#"
-- runestones: one row per catalog item, replaced wholesale on full sync
CREATE TABLE IF NOT EXISTS runestones (
    id INTEGER PRIMARY KEY,
    signature_text TEXT,
    found_location TEXT,
    parish TEXT,
    district TEXT,
    municipality TEXT,
    current_location TEXT,
    material TEXT,
    material_type TEXT,
    rune_type TEXT,
    dating TEXT,
    style TEXT,
    carver TEXT,
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    english_translation TEXT,
    swedish_translation TEXT,
    norse_text TEXT,
    transliteration TEXT,
    lost INTEGER NOT NULL DEFAULT 0,
    ornamental INTEGER NOT NULL DEFAULT 0,
    recent INTEGER NOT NULL DEFAULT 0,
    slug TEXT,
    link_url TEXT,
    direct_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_runestones_coordinates ON runestones(latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_runestones_slug ON runestones(slug);

-- cache_metadata: schema version and last refresh timestamp
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
