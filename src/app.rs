// SPDX-License-Identifier: MPL-2.0

//! Wires settings, storage, the remote client and the visited overlay together.

use crate::cache::{
    BoundingBox, CacheError, CacheEvent, CacheStatus, DocumentStore, PersistentStore, SqliteStore,
    SyncCache,
};
use crate::config::{DOCUMENT_FILE_NAME, SQLITE_FILE_NAME};
use crate::remote::{RemoteDataSource, RemoteError, Runestone, SupabaseClient};
use crate::state::{
    AuthState, Backend, Settings, SettingsError, User, VisitedError, VisitedOverlay,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Visited(#[from] VisitedError),
}

/// Open the configured backend, running its schema check.
pub fn open_store(settings: &Settings) -> Result<Arc<dyn PersistentStore>, AppError> {
    let dir = settings.cache_dir()?;

    let store: Arc<dyn PersistentStore> = match settings.backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(&dir.join(SQLITE_FILE_NAME))?),
        Backend::Document => Arc::new(DocumentStore::open(&dir.join(DOCUMENT_FILE_NAME))?),
    };
    tracing::debug!(backend = ?settings.backend, dir = %dir.display(), "opened catalog store");
    Ok(store)
}

pub struct RunestonesApp {
    cache: Arc<SyncCache>,
    visited: Arc<VisitedOverlay>,
    /// Present when talking to the real backend; carries the user token
    client: Option<Arc<SupabaseClient>>,
}

impl RunestonesApp {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let store = open_store(settings)?;
        let client = Arc::new(SupabaseClient::new(&settings.api_url, &settings.api_key)?);

        let mut app = Self::from_parts(settings, store, client.clone());
        app.client = Some(client);
        Ok(app)
    }

    /// Build around an arbitrary store and remote.
    pub fn from_parts(
        settings: &Settings,
        store: Arc<dyn PersistentStore>,
        remote: Arc<dyn RemoteDataSource>,
    ) -> Self {
        let cache = SyncCache::new(store, remote.clone(), settings.sync_options());
        let visited = VisitedOverlay::new(remote, settings.retry_policy());

        Self {
            cache: Arc::new(cache),
            visited: Arc::new(visited),
            client: None,
        }
    }

    pub fn cache(&self) -> &Arc<SyncCache> {
        &self.cache
    }

    pub fn visited(&self) -> &Arc<VisitedOverlay> {
        &self.visited
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    /// Install the user's token and load their visited set.
    pub async fn sign_in(&self, user: &User, access_token: Option<String>) -> Result<(), AppError> {
        if let Some(client) = &self.client {
            client.set_access_token(access_token);
        }
        self.visited
            .on_auth_changed(AuthState::from_user(Some(user)))
            .await?;
        Ok(())
    }

    pub async fn sign_out(&self) {
        let pending = self.visited.on_auth_changed(AuthState::LoggedOut);
        if let Some(client) = &self.client {
            client.set_access_token(None);
        }
        // Nothing to fetch when logged out
        let _ = pending.await;
    }

    pub async fn all(&self) -> Result<Vec<Runestone>, AppError> {
        let items = self.cache.get_all().await?;
        Ok(self.visited.apply_to(&items))
    }

    pub async fn in_bounds(&self, bbox: BoundingBox) -> Result<Vec<Runestone>, AppError> {
        let items = self.cache.get_by_bounds(bbox).await?;
        Ok(self.visited.apply_to(&items))
    }

    pub async fn by_slug(&self, slug: &str) -> Result<Option<Runestone>, AppError> {
        Ok(self
            .cache
            .get_by_slug(slug)
            .await?
            .map(|stone| stone.with_visited(self.visited.is_visited(stone.id))))
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Runestone>, AppError> {
        let items = self.cache.search(query, limit).await?;
        Ok(self.visited.apply_to(&items))
    }

    pub async fn refresh(&self) -> Result<usize, AppError> {
        Ok(self.cache.refresh().await?)
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        Ok(self.cache.clear().await?)
    }

    pub async fn status(&self) -> Result<CacheStatus, AppError> {
        Ok(self.cache.status().await?)
    }

    pub async fn visited_details(&self) -> Result<Vec<Runestone>, AppError> {
        Ok(self.visited.visited_details(&self.cache).await?)
    }

    pub async fn mark_visited(&self, id: i64) -> Result<(), AppError> {
        Ok(self.visited.mark_visited(id).await?)
    }

    pub async fn unmark_visited(&self, id: i64) -> Result<(), AppError> {
        Ok(self.visited.unmark_visited(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRemote, stone};
    use chrono::Utc;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir, backend: Backend) -> Settings {
        Settings {
            cache_dir: Some(dir.path().to_path_buf()),
            backend,
            expected_total: 2,
            ..Settings::default()
        }
    }

    fn verified(id: &str) -> User {
        User {
            id: id.to_string(),
            email: None,
            email_confirmed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn both_backends_serve_the_same_reads() {
        for backend in [Backend::Sqlite, Backend::Document] {
            let dir = TempDir::new().unwrap();
            let settings = settings_in(&dir, backend);
            let remote = Arc::new(FakeRemote::with_catalog(vec![
                stone(1, 59.85, 17.63),
                stone(2, 55.60, 13.00),
            ]));
            let app = RunestonesApp::from_parts(&settings, open_store(&settings).unwrap(), remote);

            assert_eq!(app.all().await.unwrap().len(), 2, "{backend:?}");
            assert_eq!(app.by_slug("stone-2").await.unwrap().unwrap().id, 2);
            assert_eq!(app.search("u 1", 10).await.unwrap().len(), 1);
        }

        let dir = TempDir::new().unwrap();
        open_store(&settings_in(&dir, Backend::Sqlite)).unwrap();
        assert!(dir.path().join(SQLITE_FILE_NAME).exists());
        open_store(&settings_in(&dir, Backend::Document)).unwrap();
        assert!(dir.path().join(DOCUMENT_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn reads_carry_visited_flag_until_sign_out() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, Backend::Sqlite);
        let remote = Arc::new(FakeRemote::with_catalog(vec![
            stone(1, 59.85, 17.63),
            stone(2, 55.60, 13.00),
        ]));
        remote.set_visited("user-1", &[2]);
        let app = RunestonesApp::from_parts(&settings, open_store(&settings).unwrap(), remote);

        app.sign_in(&verified("user-1"), None).await.unwrap();
        let flags: Vec<bool> = app.all().await.unwrap().iter().map(|s| s.visited).collect();
        assert_eq!(flags, vec![false, true]);
        assert!(app.by_slug("stone-2").await.unwrap().unwrap().visited);

        app.mark_visited(1).await.unwrap();
        assert_eq!(app.visited_details().await.unwrap().len(), 2);

        app.sign_out().await;
        assert!(app.all().await.unwrap().iter().all(|s| !s.visited));
        assert!(matches!(
            app.mark_visited(1).await,
            Err(AppError::Visited(VisitedError::NotAuthenticated))
        ));
    }

    #[tokio::test]
    async fn visited_flag_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, Backend::Document);
        let remote = Arc::new(FakeRemote::with_catalog(vec![
            stone(1, 59.85, 17.63),
            stone(2, 55.60, 13.00),
        ]));
        remote.set_visited("user-1", &[1]);
        let store = open_store(&settings).unwrap();
        let app = RunestonesApp::from_parts(&settings, store.clone(), remote);

        app.sign_in(&verified("user-1"), None).await.unwrap();
        assert!(app.all().await.unwrap()[0].visited);
        assert!(store.get_all().await.unwrap().iter().all(|s| !s.visited));
    }
}
