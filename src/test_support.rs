// SPDX-License-Identifier: MPL-2.0

//! Fixtures shared by unit tests.

use crate::cache::BoundingBox;
use crate::remote::{RemoteDataSource, RemoteError, Runestone};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn stone(id: i64, latitude: f64, longitude: f64) -> Runestone {
    Runestone {
        id,
        signature_text: Some(format!("U {id}")),
        latitude,
        longitude,
        slug: Some(format!("stone-{id}")),
        ..Runestone::default()
    }
}

/// How the fake answers mark/unmark requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReply {
    Accept,
    Reject,
    Fail,
}

/// In-memory [`RemoteDataSource`] that counts calls.
pub struct FakeRemote {
    catalog: Vec<Runestone>,
    delay: Duration,
    fail_fetch_all: AtomicBool,
    fetch_all_calls: AtomicUsize,
    bounds_calls: AtomicUsize,
    visited_delay: Mutex<Duration>,
    visited: Mutex<HashMap<String, BTreeSet<i64>>>,
    mark_reply: Mutex<MarkReply>,
}

impl FakeRemote {
    pub fn with_catalog(catalog: Vec<Runestone>) -> Self {
        Self {
            catalog,
            delay: Duration::ZERO,
            fail_fetch_all: AtomicBool::new(false),
            fetch_all_calls: AtomicUsize::new(0),
            bounds_calls: AtomicUsize::new(0),
            visited_delay: Mutex::new(Duration::ZERO),
            visited: Mutex::new(HashMap::new()),
            mark_reply: Mutex::new(MarkReply::Accept),
        }
    }

    /// Delay every full fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_fetch_all(&self, fail: bool) {
        self.fail_fetch_all.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_all_calls(&self) -> usize {
        self.fetch_all_calls.load(Ordering::SeqCst)
    }

    pub fn bounds_calls(&self) -> usize {
        self.bounds_calls.load(Ordering::SeqCst)
    }

    pub fn set_visited(&self, user_id: &str, ids: &[i64]) {
        self.visited
            .lock()
            .unwrap()
            .insert(user_id.to_string(), ids.iter().copied().collect());
    }

    pub fn visited_of(&self, user_id: &str) -> Vec<i64> {
        self.visited
            .lock()
            .unwrap()
            .get(user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn set_visited_delay(&self, delay: Duration) {
        *self.visited_delay.lock().unwrap() = delay;
    }

    pub fn set_mark_reply(&self, reply: MarkReply) {
        *self.mark_reply.lock().unwrap() = reply;
    }

    fn mark_reply(&self) -> MarkReply {
        *self.mark_reply.lock().unwrap()
    }
}

#[async_trait]
impl RemoteDataSource for FakeRemote {
    async fn fetch_all(&self) -> Result<Vec<Runestone>, RemoteError> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_fetch_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 400,
                message: "fetch disabled".to_string(),
            });
        }
        Ok(self.catalog.clone())
    }

    async fn fetch_by_bounds(&self, bbox: BoundingBox) -> Result<Vec<Runestone>, RemoteError> {
        self.bounds_calls.fetch_add(1, Ordering::SeqCst);
        // Rows with unusable coordinates slip through the server-side filter
        Ok(self
            .catalog
            .iter()
            .filter(|s| {
                !s.latitude.is_finite()
                    || !s.longitude.is_finite()
                    || bbox.contains(s.latitude, s.longitude)
            })
            .cloned()
            .collect())
    }

    async fn fetch_visited_ids(&self, user_id: &str) -> Result<Vec<i64>, RemoteError> {
        let delay = *self.visited_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.visited_of(user_id))
    }

    async fn mark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError> {
        match self.mark_reply() {
            MarkReply::Accept => {
                self.visited
                    .lock()
                    .unwrap()
                    .entry(user_id.to_string())
                    .or_default()
                    .insert(item_id);
                Ok(true)
            }
            MarkReply::Reject => Ok(false),
            MarkReply::Fail => Err(RemoteError::Network("connection refused".to_string())),
        }
    }

    async fn unmark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError> {
        match self.mark_reply() {
            MarkReply::Accept => {
                if let Some(ids) = self.visited.lock().unwrap().get_mut(user_id) {
                    ids.remove(&item_id);
                }
                Ok(true)
            }
            MarkReply::Reject => Ok(false),
            MarkReply::Fail => Err(RemoteError::Network("connection refused".to_string())),
        }
    }
}
