// SPDX-License-Identifier: MPL-2.0

//! Per-user set of visited catalog items.
//!
//! The set is never persisted. It is fetched when a user becomes fully
//! authenticated, emptied synchronously when they stop being so, and changed
//! by mark/unmark only after the remote confirms.

use crate::cache::{CacheError, SyncCache};
use crate::remote::{RemoteDataSource, RemoteError, RetryPolicy, Runestone, with_backoff};
use crate::state::auth::AuthState;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum VisitedError {
    #[error("sign in with a verified account to track visits")]
    NotAuthenticated,
    #[error("server refused to update visit for runestone {id}")]
    Rejected { id: i64 },
    #[error("visit update failed: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitedEvent {
    /// Set replaced by a fresh fetch
    Replaced,
    Added(i64),
    Removed(i64),
    Cleared,
}

#[derive(Default)]
struct Inner {
    auth: AuthState,
    ids: HashSet<i64>,
    /// Bumped on every auth change; fetches from an older generation are dropped
    generation: u64,
    loading: bool,
    last_error: Option<String>,
}

pub struct VisitedOverlay {
    remote: Arc<dyn RemoteDataSource>,
    retry: RetryPolicy,
    inner: RwLock<Inner>,
    events: broadcast::Sender<VisitedEvent>,
}

impl VisitedOverlay {
    pub fn new(remote: Arc<dyn RemoteDataSource>, retry: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            remote,
            retry,
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: VisitedEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisitedEvent> {
        self.events.subscribe()
    }

    pub fn auth_state(&self) -> AuthState {
        self.read().auth.clone()
    }

    pub fn is_visited(&self, id: i64) -> bool {
        self.read().ids.contains(&id)
    }

    pub fn visited_count(&self) -> usize {
        self.read().ids.len()
    }

    /// Sorted snapshot of the set
    pub fn visited_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.read().ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Share of `total` visited, rounded to a whole percent
    pub fn completion_percentage(&self, total: usize) -> u32 {
        if total == 0 {
            return 0;
        }
        let visited = self.visited_count().min(total);
        ((visited * 100 + total / 2) / total) as u32
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// Message from the most recent failed fetch or mark/unmark
    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    /// Copy of `items` with `visited` derived from the current set.
    pub fn apply_to(&self, items: &[Runestone]) -> Vec<Runestone> {
        let inner = self.read();
        items
            .iter()
            .map(|stone| stone.with_visited(inner.ids.contains(&stone.id)))
            .collect()
    }

    /// Catalog entries for every visited id.
    pub async fn visited_details(&self, cache: &SyncCache) -> Result<Vec<Runestone>, CacheError> {
        if self.visited_count() == 0 {
            return Ok(Vec::new());
        }

        let items = cache.get_all().await?;
        let inner = self.read();
        Ok(items
            .into_iter()
            .filter(|stone| inner.ids.contains(&stone.id))
            .map(|stone| stone.with_visited(true))
            .collect())
    }

    /// React to an authentication transition.
    ///
    /// Re-announcing the current state is ignored. On a real change the set is
    /// emptied before this returns. The returned future performs the
    /// fetch for a fully authenticated user; its result is dropped if the auth
    /// state changes again before it completes.
    pub fn on_auth_changed(
        &self,
        auth: AuthState,
    ) -> impl Future<Output = Result<(), VisitedError>> + Send + '_ {
        let pending = {
            let mut inner = self.write();
            if inner.auth == auth {
                // Same state re-announced, e.g. on token refresh
                None
            } else {
                let had_ids = !inner.ids.is_empty();
                inner.generation += 1;
                inner.ids.clear();
                inner.last_error = None;
                inner.loading = auth.is_fully_authenticated();
                inner.auth = auth;
                Some((
                    inner.generation,
                    inner.auth.user_id().map(str::to_string),
                    had_ids,
                ))
            }
        };

        let fetch = match pending {
            Some((generation, user_id, had_ids)) => {
                if had_ids {
                    self.publish(VisitedEvent::Cleared);
                }
                user_id.map(|user_id| (generation, user_id))
            }
            None => None,
        };

        async move {
            let Some((generation, user_id)) = fetch else {
                return Ok(());
            };
            self.fetch(generation, &user_id).await
        }
    }

    async fn fetch(&self, generation: u64, user_id: &str) -> Result<(), VisitedError> {
        let remote = &self.remote;
        let result = with_backoff(&self.retry, "fetch_visited_ids", move || {
            remote.fetch_visited_ids(user_id)
        })
        .await;

        let mut inner = self.write();
        if inner.generation != generation {
            tracing::debug!(user_id, "auth changed during visited fetch, discarding result");
            return Ok(());
        }
        inner.loading = false;

        match result {
            Ok(ids) => {
                inner.ids = ids.into_iter().collect();
                let count = inner.ids.len();
                drop(inner);
                tracing::info!(user_id, count, "visited runestones loaded");
                self.publish(VisitedEvent::Replaced);
                Ok(())
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                drop(inner);
                tracing::error!(user_id, error = %e, "failed to load visited runestones");
                Err(e.into())
            }
        }
    }

    /// Current user and auth generation, or an error if no verified user is signed in.
    fn require_user(&self) -> Result<(u64, String), VisitedError> {
        let mut inner = self.write();
        match inner.auth.user_id().map(str::to_string) {
            Some(user_id) => Ok((inner.generation, user_id)),
            None => {
                inner.last_error = Some(VisitedError::NotAuthenticated.to_string());
                Err(VisitedError::NotAuthenticated)
            }
        }
    }

    fn record_failure(&self, generation: u64, error: &VisitedError) {
        let mut inner = self.write();
        if inner.generation == generation {
            inner.last_error = Some(error.to_string());
        }
    }

    pub async fn mark_visited(&self, id: i64) -> Result<(), VisitedError> {
        self.update(id, true).await
    }

    pub async fn unmark_visited(&self, id: i64) -> Result<(), VisitedError> {
        self.update(id, false).await
    }

    /// Confirm with the remote, then apply locally.
    async fn update(&self, id: i64, visited: bool) -> Result<(), VisitedError> {
        let (generation, user_id) = self.require_user()?;
        let remote = &self.remote;
        let user = user_id.as_str();
        // Writes are not retried
        let policy = RetryPolicy::once(self.retry.timeout);

        let confirmed = if visited {
            with_backoff(&policy, "mark_visited", move || remote.mark_visited(id, user)).await
        } else {
            with_backoff(&policy, "unmark_visited", move || {
                remote.unmark_visited(id, user)
            })
            .await
        };

        let error = match confirmed {
            Ok(true) => {
                let applied = {
                    let mut inner = self.write();
                    if inner.generation != generation {
                        false
                    } else {
                        inner.last_error = None;
                        if visited {
                            inner.ids.insert(id)
                        } else {
                            inner.ids.remove(&id)
                        }
                    }
                };

                if applied {
                    tracing::debug!(id, visited, "visited set updated");
                    self.publish(if visited {
                        VisitedEvent::Added(id)
                    } else {
                        VisitedEvent::Removed(id)
                    });
                }
                return Ok(());
            }
            Ok(false) => VisitedError::Rejected { id },
            Err(e) => VisitedError::Remote(e),
        };

        tracing::warn!(id, visited, error = %error, "visit update failed");
        self.record_failure(generation, &error);
        Err(error)
    }
}
