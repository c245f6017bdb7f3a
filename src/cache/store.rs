// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use crate::remote::Runestone;
use async_trait::async_trait;

/// Metadata key holding the on-disk schema version
pub const META_SCHEMA_VERSION: &str = "schema_version";
/// Metadata key holding the last full refresh, epoch milliseconds
pub const META_LAST_UPDATE: &str = "last_update";

/// Durable mirror of the catalog plus cache metadata.
///
/// Implementations must not require the caller to know anything about the
/// backing technology. Schema-version checks happen when a store is opened.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn count(&self) -> Result<usize, CacheError>;

    /// Every stored item, ordered by id.
    async fn get_all(&self) -> Result<Vec<Runestone>, CacheError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Runestone>, CacheError>;

    /// Insert or replace by id. Atomic per call.
    async fn bulk_upsert(&self, items: &[Runestone]) -> Result<(), CacheError>;

    /// Remove every catalog item; metadata is left alone.
    async fn delete_all(&self) -> Result<(), CacheError>;

    /// Swap the whole catalog for `items`.
    ///
    /// The default deletes every row and upserts `items` in batches of
    /// `batch_size`, one transaction per batch.
    async fn replace_all(&self, items: &[Runestone], batch_size: usize) -> Result<(), CacheError> {
        self.delete_all().await?;
        for batch in items.chunks(batch_size.max(1)) {
            self.bulk_upsert(batch).await?;
        }
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn remove_metadata(&self, key: &str) -> Result<(), CacheError>;
}
