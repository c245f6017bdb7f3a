// SPDX-License-Identifier: MPL-2.0

mod client;
mod retry;
mod types;

pub use client::SupabaseClient;
pub use retry::{RetryPolicy, with_backoff};
pub use types::{Runestone, RunestoneRow, VisitedRow, coordinate};

use crate::cache::BoundingBox;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("not authenticated")]
    NotAuthenticated,
}

impl RemoteError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::NotAuthenticated => false,
        }
    }
}

/// Authoritative source of the catalog and of per-user visited records.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Entire catalog.
    async fn fetch_all(&self) -> Result<Vec<Runestone>, RemoteError>;

    /// Items whose coordinates fall inside `bbox`.
    async fn fetch_by_bounds(&self, bbox: BoundingBox) -> Result<Vec<Runestone>, RemoteError>;

    async fn fetch_visited_ids(&self, user_id: &str) -> Result<Vec<i64>, RemoteError>;

    /// Returns whether the server recorded the visit.
    async fn mark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError>;

    /// Returns whether the server removed the visit.
    async fn unmark_visited(&self, item_id: i64, user_id: &str) -> Result<bool, RemoteError>;
}
