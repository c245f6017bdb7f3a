// SPDX-License-Identifier: MPL-2.0

//! Local-first mirror of the runestone catalog.
//!
//! [`SyncCache`] serves every read from a local [`PersistentStore`] and
//! hydrates it from a [`RemoteDataSource`]. [`VisitedOverlay`] tracks which
//! stones the signed-in user has visited without ever persisting that state.

pub mod app;
pub mod cache;
pub mod config;
pub mod remote;
pub mod runtime;
pub mod state;

#[cfg(test)]
mod test_support;

pub use app::{AppError, RunestonesApp};
pub use cache::{BoundingBox, CacheError, CacheEvent, PersistentStore, SyncCache, SyncOptions};
pub use remote::{RemoteDataSource, RemoteError, Runestone, SupabaseClient};
pub use state::{AuthState, Settings, User, VisitedError, VisitedEvent, VisitedOverlay};
