// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "se.runestones.Explorer";
pub const APP_NAME: &str = "Runestones";

pub const DEFAULT_API_URL: &str = "http://localhost:54321";

/// Size of the full catalog; a smaller mirror is treated as incomplete
pub const TOTAL_RUNESTONES: usize = 6815;

/// Mirror age in days after which a full refresh is forced
pub const RETENTION_DAYS: u32 = 365;

/// Rows written per store transaction during a full refresh
pub const BATCH_SIZE: usize = 100;

pub const DEFAULT_SEARCH_LIMIT: usize = 100;

pub use crate::cache::SCHEMA_VERSION;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const CACHE_DIR_NAME: &str = "runestones";
pub const SQLITE_FILE_NAME: &str = "runestones.db";
pub const DOCUMENT_FILE_NAME: &str = "runestones.json";
