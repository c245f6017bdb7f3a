// SPDX-License-Identifier: MPL-2.0

//! Schemaless document store for the catalog mirror.
//!
//! Items are kept as keyed JSON documents in memory and flushed as a single
//! file after every write. The flush goes through a temporary file and a
//! rename, so a crash leaves either the old or the new document on disk.

use crate::cache::schema::SCHEMA_VERSION;
use crate::cache::store::{META_SCHEMA_VERSION, PersistentStore};
use crate::cache::CacheError;
use crate::remote::Runestone;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// On-disk shape of the whole store
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    items: BTreeMap<i64, Runestone>,
}

impl Document {
    fn fresh() -> Self {
        let mut doc = Self::default();
        doc.metadata
            .insert(META_SCHEMA_VERSION.to_string(), SCHEMA_VERSION.to_string());
        doc
    }

    fn schema_version(&self) -> Option<i64> {
        self.metadata
            .get(META_SCHEMA_VERSION)
            .and_then(|v| v.parse().ok())
    }
}

/// Catalog mirror stored as JSON documents in a single file
pub struct DocumentStore {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    doc: Mutex<Document>,
}

impl DocumentStore {
    /// Open or create the document file at `path`.
    ///
    /// Unreadable files and schema-version mismatches start from an empty store.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Path(format!("failed to create cache dir: {e}")))?;
        }

        let doc = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Document>(&contents) {
                Ok(doc) if doc.schema_version() == Some(SCHEMA_VERSION) => doc,
                Ok(doc) => {
                    tracing::info!(
                        current = ?doc.schema_version(),
                        target = SCHEMA_VERSION,
                        "document store schema mismatch, discarding contents"
                    );
                    Document::fresh()
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "unreadable document store, starting over");
                    Document::fresh()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::fresh(),
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            path: Some(path.to_path_buf()),
            doc: Mutex::new(doc),
        };
        store.flush(&store.lock())?;
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(Document::fresh()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the whole document via temp file + rename
    fn flush(&self, doc: &Document) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec(doc)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Apply `change`, flush, and roll the in-memory copy back if the flush fails.
    fn write<F>(&self, change: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut Document),
    {
        let mut doc = self.lock();
        let before = doc.clone();
        change(&mut doc);

        if let Err(e) = self.flush(&doc) {
            *doc = before;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for DocumentStore {
    async fn count(&self) -> Result<usize, CacheError> {
        Ok(self.lock().items.len())
    }

    async fn get_all(&self) -> Result<Vec<Runestone>, CacheError> {
        Ok(self.lock().items.values().cloned().collect())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Runestone>, CacheError> {
        Ok(self
            .lock()
            .items
            .values()
            .find(|stone| stone.slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn bulk_upsert(&self, items: &[Runestone]) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }

        self.write(|doc| {
            for stone in items {
                doc.items.insert(stone.id, stone.with_visited(false));
            }
        })
    }

    async fn delete_all(&self) -> Result<(), CacheError> {
        self.write(|doc| doc.items.clear())
    }

    /// Staged in memory and flushed once; batching buys nothing for a single file.
    async fn replace_all(&self, items: &[Runestone], _batch_size: usize) -> Result<(), CacheError> {
        self.write(|doc| {
            doc.items = items
                .iter()
                .map(|stone| (stone.id, stone.with_visited(false)))
                .collect();
        })
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.lock().metadata.get(key).cloned())
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.write(|doc| {
            doc.metadata.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove_metadata(&self, key: &str) -> Result<(), CacheError> {
        self.write(|doc| {
            doc.metadata.remove(key);
        })
    }
}
