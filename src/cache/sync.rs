// SPDX-License-Identifier: MPL-2.0

//! Local-first orchestration of the catalog mirror.
//!
//! Reads are always served from the [`PersistentStore`]. The remote source is
//! consulted when the mirror is empty, incomplete, or older than the
//! retention window, and for bounded queries over regions not yet covered.

use crate::cache::bounds::{BoundingBox, CoveredRegions};
use crate::cache::store::{META_LAST_UPDATE, PersistentStore};
use crate::cache::CacheError;
use crate::config::{BATCH_SIZE, RETENTION_DAYS, TOTAL_RUNESTONES};
use crate::remote::{RemoteDataSource, RetryPolicy, Runestone, with_backoff};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 32;

/// Current unix time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Tunables for [`SyncCache`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Known size of the full catalog
    pub expected_total: usize,
    /// Mirror age after which a full refresh is forced
    pub retention: Duration,
    /// Rows per store transaction during a full replace
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            expected_total: TOTAL_RUNESTONES,
            retention: Duration::from_secs(u64::from(RETENTION_DAYS) * 24 * 60 * 60),
            batch_size: BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The mirror was rebuilt from a full fetch
    CatalogReplaced { count: usize },
    /// A bounded fetch was merged into the mirror
    RegionMerged { count: usize },
    Cleared,
}

/// Snapshot of mirror health
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub rows: usize,
    pub expected_total: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub stale: bool,
    pub initialized: bool,
    pub covered_regions: usize,
}

/// Single source of truth for the catalog.
pub struct SyncCache {
    store: Arc<dyn PersistentStore>,
    remote: Arc<dyn RemoteDataSource>,
    options: SyncOptions,
    /// Serializes initialization, refresh and clear
    init_gate: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    /// Completed initialization attempts, successful or not
    init_attempts: AtomicU64,
    /// Error of the most recent failed attempt, handed to callers that waited on it
    init_failure: Mutex<Option<Arc<CacheError>>>,
    /// A full fetch already completed this session
    fully_synced: AtomicBool,
    /// Epoch millis of the last full refresh, 0 when unknown
    last_update: AtomicI64,
    covered: Mutex<CoveredRegions>,
    events: broadcast::Sender<CacheEvent>,
}

impl SyncCache {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        remote: Arc<dyn RemoteDataSource>,
        options: SyncOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            store,
            remote,
            options,
            init_gate: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            init_attempts: AtomicU64::new(0),
            init_failure: Mutex::new(None),
            fully_synced: AtomicBool::new(false),
            last_update: AtomicI64::new(0),
            covered: Mutex::new(CoveredRegions::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn covered(&self) -> MutexGuard<'_, CoveredRegions> {
        self.covered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_stale_at(&self, last_update: i64, now: i64) -> bool {
        let retention = i64::try_from(self.options.retention.as_millis()).unwrap_or(i64::MAX);
        last_update <= 0 || now.saturating_sub(last_update) > retention
    }

    /// Whether the last known full refresh is older than the retention window
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(self.last_update.load(Ordering::Acquire), now_millis())
    }

    async fn stored_last_update(&self) -> i64 {
        match self.store.get_metadata(META_LAST_UPDATE).await {
            Ok(value) => value.and_then(|v| v.parse().ok()).unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read last refresh timestamp");
                0
            }
        }
    }

    /// Every stored item; storage failures degrade to an empty list.
    async fn read_all(&self) -> Vec<Runestone> {
        match self.store.get_all().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read catalog mirror");
                Vec::new()
            }
        }
    }

    /// Trust the mirror if it is complete and fresh, otherwise rebuild it.
    ///
    /// Callers arriving while an attempt is running share its outcome, failure
    /// included, so at most one full fetch runs per wave of callers. A failure
    /// leaves the cache uninitialized so the next call starts a new attempt.
    pub async fn ensure_initialized(&self) -> Result<(), CacheError> {
        if self.is_initialized() {
            return Ok(());
        }

        let seen = self.init_attempts.load(Ordering::Acquire);
        let _gate = self.init_gate.lock().await;
        if self.is_initialized() {
            return Ok(());
        }
        if self.init_attempts.load(Ordering::Acquire) != seen {
            let failure = self
                .init_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(error) = failure {
                return Err(CacheError::Initialization(error));
            }
        }

        let result = match self.initialize().await {
            Ok(()) => {
                self.initialized.store(true, Ordering::Release);
                *self.init_failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
                Ok(())
            }
            Err(e) => {
                let error = Arc::new(e);
                *self.init_failure.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(error.clone());
                Err(CacheError::Initialization(error))
            }
        };
        self.init_attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// One initialization attempt. Caller holds the gate.
    async fn initialize(&self) -> Result<(), CacheError> {
        let count = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "failed to count mirrored rows, treating as empty");
                0
            }
        };
        let last_update = self.stored_last_update().await;
        self.last_update.store(last_update, Ordering::Release);

        if count >= self.options.expected_total && !self.is_stale_at(last_update, now_millis()) {
            tracing::debug!(count, "catalog mirror is complete and fresh");
            self.covered().mark_world();
            return Ok(());
        }

        tracing::info!(
            count,
            expected = self.options.expected_total,
            last_update,
            "catalog mirror incomplete or stale, fetching from remote"
        );
        self.replace_from_remote().await?;
        Ok(())
    }

    /// Fetch the whole catalog and rebuild the mirror. Caller holds the gate.
    async fn replace_from_remote(&self) -> Result<usize, CacheError> {
        let items: Vec<Runestone> =
            with_backoff(&self.options.retry, "fetch_all", || self.remote.fetch_all())
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "failed to fetch full catalog");
                    CacheError::Remote(e)
                })?
                .into_iter()
                .map(Runestone::normalized)
                .collect();

        if let Err(e) = self.write_mirror(&items).await {
            tracing::error!(error = %e, "failed to store full catalog");
            return Err(e);
        }

        let count = items.len();
        tracing::info!(count, "catalog mirror replaced");
        self.publish(CacheEvent::CatalogReplaced { count });
        Ok(count)
    }

    async fn write_mirror(&self, items: &[Runestone]) -> Result<(), CacheError> {
        self.store
            .replace_all(items, self.options.batch_size)
            .await?;

        let now = now_millis();
        self.store
            .set_metadata(META_LAST_UPDATE, &now.to_string())
            .await?;
        self.last_update.store(now, Ordering::Release);
        self.covered().mark_world();
        self.fully_synced.store(true, Ordering::Release);
        Ok(())
    }

    /// Force a full fetch regardless of mirror state.
    pub async fn refresh(&self) -> Result<usize, CacheError> {
        let _gate = self.init_gate.lock().await;
        let count = self.replace_from_remote().await?;
        self.initialized.store(true, Ordering::Release);
        Ok(count)
    }

    /// All catalog items.
    ///
    /// If the mirror holds fewer rows than the known total and no full fetch
    /// has completed this session, one corrective fetch runs first.
    pub async fn get_all(&self) -> Result<Vec<Runestone>, CacheError> {
        self.ensure_initialized().await?;

        let items = self.read_all().await;
        if items.len() >= self.options.expected_total || self.fully_synced.load(Ordering::Acquire)
        {
            return Ok(items);
        }

        tracing::info!(
            rows = items.len(),
            expected = self.options.expected_total,
            "mirror incomplete, running corrective fetch"
        );
        match self.refresh().await {
            Ok(_) => Ok(self.read_all().await),
            Err(e) => {
                tracing::warn!(error = %e, "corrective fetch failed, serving partial mirror");
                Ok(items)
            }
        }
    }

    /// Items inside `bbox`, edges inclusive.
    pub async fn get_by_bounds(&self, bbox: BoundingBox) -> Result<Vec<Runestone>, CacheError> {
        if self.is_initialized() && self.is_stale() {
            tracing::info!("catalog mirror went stale, clearing before refresh");
            self.clear().await?;
        }

        if let Err(e) = self.ensure_initialized().await {
            tracing::warn!(error = %e, "mirror unavailable, falling back to bounded fetch");
        }

        if self.covered().covers(&bbox) {
            return Ok(bbox.filter(self.read_all().await));
        }

        let fetched = with_backoff(&self.options.retry, "fetch_by_bounds", || {
            self.remote.fetch_by_bounds(bbox)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, bbox = %bbox.key(), "bounded fetch failed");
            CacheError::Remote(e)
        })?
        .into_iter()
        .map(Runestone::normalized)
        .collect::<Vec<_>>();

        match self.store.bulk_upsert(&fetched).await {
            Ok(()) => self.publish(CacheEvent::RegionMerged {
                count: fetched.len(),
            }),
            Err(e) => tracing::warn!(error = %e, "failed to merge bounded fetch into mirror"),
        }
        self.covered().record(bbox);

        Ok(fetched)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Runestone>, CacheError> {
        self.ensure_initialized().await?;

        match self.store.get_by_slug(slug).await {
            Ok(stone) => Ok(stone),
            Err(e) => {
                tracing::warn!(error = %e, slug, "slug lookup failed");
                Ok(None)
            }
        }
    }

    /// Case-insensitive substring search over the descriptive fields.
    ///
    /// A blank query returns nothing without touching storage.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Runestone>, CacheError> {
        let term = query.trim().to_lowercase();
        if term.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        self.ensure_initialized().await?;

        Ok(self
            .read_all()
            .await
            .into_iter()
            .filter(|stone| stone.matches(&term))
            .take(limit)
            .collect())
    }

    /// Wipe rows and refresh metadata and forget everything known this session.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _gate = self.init_gate.lock().await;

        self.store.delete_all().await?;
        self.store.remove_metadata(META_LAST_UPDATE).await?;

        self.last_update.store(0, Ordering::Release);
        self.covered().clear();
        self.initialized.store(false, Ordering::Release);
        self.fully_synced.store(false, Ordering::Release);

        tracing::info!("catalog mirror cleared");
        self.publish(CacheEvent::Cleared);
        Ok(())
    }

    pub async fn status(&self) -> Result<CacheStatus, CacheError> {
        let rows = self.store.count().await?;
        let last_update = self.stored_last_update().await;

        Ok(CacheStatus {
            rows,
            expected_total: self.options.expected_total,
            last_update: (last_update > 0)
                .then(|| DateTime::from_timestamp_millis(last_update))
                .flatten(),
            stale: self.is_stale_at(last_update, now_millis()),
            initialized: self.is_initialized(),
            covered_regions: self.covered().len(),
        })
    }
}
