// SPDX-License-Identifier: MPL-2.0

use crate::cache::schema::{DROP_SCHEMA, SCHEMA, SCHEMA_VERSION};
use crate::cache::store::{META_SCHEMA_VERSION, PersistentStore};
use crate::cache::CacheError;
use crate::remote::Runestone;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, signature_text, found_location, parish, district, municipality,
        current_location, material, material_type, rune_type, dating, style,
        carver, latitude, longitude, english_translation, swedish_translation,
        norse_text, transliteration, lost, ornamental, recent, slug,
        link_url, direct_url
    FROM runestones
"#;

/// Catalog mirror stored in an embedded SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`, migrating if needed
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Path(format!("failed to create cache dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Volatile database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Destructive migration: any version mismatch drops every table.
    fn migrate(conn: &Connection) -> Result<(), CacheError> {
        let current = Self::stored_schema_version(conn);

        if current != Some(SCHEMA_VERSION) {
            tracing::info!(
                current = ?current,
                target = SCHEMA_VERSION,
                "cache schema version mismatch, rebuilding tables"
            );
            conn.execute_batch(DROP_SCHEMA)?;
        }

        // All CREATE IF NOT EXISTS
        conn.execute_batch(SCHEMA)?;

        if current != Some(SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES (?1, ?2)",
                params![META_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
            )?;
        }

        Ok(())
    }

    /// `None` when the metadata table is missing or holds garbage
    fn stored_schema_version(conn: &Connection) -> Option<i64> {
        conn.query_row(
            "SELECT value FROM cache_metadata WHERE key = ?",
            [META_SCHEMA_VERSION],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|value| value.parse().ok())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Convert a database row to a Runestone
    fn row_to_runestone(row: &rusqlite::Row) -> Result<Runestone, rusqlite::Error> {
        Ok(Runestone {
            id: row.get(0)?,
            signature_text: row.get(1)?,
            found_location: row.get(2)?,
            parish: row.get(3)?,
            district: row.get(4)?,
            municipality: row.get(5)?,
            current_location: row.get(6)?,
            material: row.get(7)?,
            material_type: row.get(8)?,
            rune_type: row.get(9)?,
            dating: row.get(10)?,
            style: row.get(11)?,
            carver: row.get(12)?,
            latitude: row.get(13)?,
            longitude: row.get(14)?,
            english_translation: row.get(15)?,
            swedish_translation: row.get(16)?,
            norse_text: row.get(17)?,
            transliteration: row.get(18)?,
            lost: row.get::<_, i32>(19)? != 0,
            ornamental: row.get::<_, i32>(20)? != 0,
            recent: row.get::<_, i32>(21)? != 0,
            visited: false,
            slug: row.get(22)?,
            link_url: row.get(23)?,
            direct_url: row.get(24)?,
        })
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn count(&self) -> Result<usize, CacheError> {
        let conn = self.conn();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runestones", [], |row| row.get(0))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn get_all(&self) -> Result<Vec<Runestone>, CacheError> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))?;
        let mut rows = stmt.query([])?;
        let mut stones = Vec::new();

        while let Some(row) = rows.next()? {
            stones.push(Self::row_to_runestone(row)?);
        }

        Ok(stones)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Runestone>, CacheError> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE slug = ? LIMIT 1"))?;
        let stone = stmt
            .query_row([slug], Self::row_to_runestone)
            .optional()?;

        Ok(stone)
    }

    async fn bulk_upsert(&self, items: &[Runestone]) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO runestones (
                    id, signature_text, found_location, parish, district, municipality,
                    current_location, material, material_type, rune_type, dating, style,
                    carver, latitude, longitude, english_translation, swedish_translation,
                    norse_text, transliteration, lost, ornamental, recent, slug,
                    link_url, direct_url
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
                )
                ON CONFLICT(id) DO UPDATE SET
                    signature_text = excluded.signature_text,
                    found_location = excluded.found_location,
                    parish = excluded.parish,
                    district = excluded.district,
                    municipality = excluded.municipality,
                    current_location = excluded.current_location,
                    material = excluded.material,
                    material_type = excluded.material_type,
                    rune_type = excluded.rune_type,
                    dating = excluded.dating,
                    style = excluded.style,
                    carver = excluded.carver,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    english_translation = excluded.english_translation,
                    swedish_translation = excluded.swedish_translation,
                    norse_text = excluded.norse_text,
                    transliteration = excluded.transliteration,
                    lost = excluded.lost,
                    ornamental = excluded.ornamental,
                    recent = excluded.recent,
                    slug = excluded.slug,
                    link_url = excluded.link_url,
                    direct_url = excluded.direct_url
                "#,
            )?;

            for stone in items {
                stmt.execute(params![
                    stone.id,
                    stone.signature_text,
                    stone.found_location,
                    stone.parish,
                    stone.district,
                    stone.municipality,
                    stone.current_location,
                    stone.material,
                    stone.material_type,
                    stone.rune_type,
                    stone.dating,
                    stone.style,
                    stone.carver,
                    stone.latitude,
                    stone.longitude,
                    stone.english_translation,
                    stone.swedish_translation,
                    stone.norse_text,
                    stone.transliteration,
                    stone.lost as i32,
                    stone.ornamental as i32,
                    stone.recent as i32,
                    stone.slug,
                    stone.link_url,
                    stone.direct_url,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), CacheError> {
        let conn = self.conn();
        conn.execute("DELETE FROM runestones", [])?;
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn();

        let value = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO cache_metadata (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;

        Ok(())
    }

    async fn remove_metadata(&self, key: &str) -> Result<(), CacheError> {
        let conn = self.conn();
        conn.execute("DELETE FROM cache_metadata WHERE key = ?", [key])?;
        Ok(())
    }
}
