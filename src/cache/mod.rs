// SPDX-License-Identifier: MPL-2.0

mod bounds;
mod db;
mod document;
mod schema;
mod store;
mod sync;

pub use bounds::{BoundingBox, CoveredRegions};
pub use db::SqliteStore;
pub use document::DocumentStore;
pub use schema::SCHEMA_VERSION;
pub use store::{META_LAST_UPDATE, META_SCHEMA_VERSION, PersistentStore};
pub use sync::{CacheEvent, CacheStatus, SyncCache, SyncOptions, now_millis};

use crate::remote::RemoteError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache path error: {0}")]
    Path(String),
    #[error("remote fetch failed: {0}")]
    Remote(#[from] RemoteError),
    /// Outcome of an initialization attempt another caller was already running
    #[error("catalog initialization failed: {0}")]
    Initialization(Arc<CacheError>),
}
