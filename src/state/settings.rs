// SPDX-License-Identifier: MPL-2.0

use crate::cache::SyncOptions;
use crate::config::{
    APP_ID, BATCH_SIZE, CACHE_DIR_NAME, DEFAULT_API_URL, RETENTION_DAYS, SETTINGS_FILE_NAME,
    TOTAL_RUNESTONES,
};
use crate::remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_API_URL: &str = "RUNESTONES_API_URL";
pub const ENV_API_KEY: &str = "RUNESTONES_API_KEY";
pub const ENV_CACHE_DIR: &str = "RUNESTONES_CACHE_DIR";
pub const ENV_BACKEND: &str = "RUNESTONES_BACKEND";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("could not determine data directory")]
    NoDataDir,
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
    #[error("failed to access settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where the catalog mirror lives
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded SQLite database
    #[default]
    Sqlite,
    /// Single JSON document file
    Document,
}

impl FromStr for Backend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "document" | "json" => Ok(Self::Document),
            other => Err(SettingsError::UnknownBackend(other.to_string())),
        }
    }
}

/// Persistent application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub backend: Backend,
    /// Defaults to `<data_dir>/runestones`
    pub cache_dir: Option<PathBuf>,
    pub expected_total: usize,
    pub retention_days: u32,
    pub fetch_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let retry = RetryPolicy::default();

        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            backend: Backend::default(),
            cache_dir: None,
            expected_total: TOTAL_RUNESTONES,
            retention_days: RETENTION_DAYS,
            fetch_timeout_secs: retry.timeout.as_secs(),
            retry_attempts: retry.attempts,
            retry_initial_delay_ms: retry.initial_delay.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Get the settings file path (~/.config/se.runestones.Explorer/settings.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push(SETTINGS_FILE_NAME);
            p
        })
    }

    /// Load settings from disk, then apply environment overrides
    pub fn load() -> Self {
        let mut settings = match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Read `path`, falling back to defaults if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "invalid settings file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            match backend.parse() {
                Ok(backend) => self.backend = backend,
                Err(e) => tracing::warn!(error = %e, "ignoring {ENV_BACKEND}"),
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn cache_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(CACHE_DIR_NAME))
                .ok_or(SettingsError::NoDataDir),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            ..RetryPolicy::default()
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            expected_total: self.expected_total,
            retention: Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60),
            batch_size: BATCH_SIZE,
            retry: self.retry_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_catalog() {
        let settings = Settings::default();
        assert_eq!(settings.expected_total, 6815);
        assert_eq!(settings.retention_days, 365);
        assert_eq!(settings.backend, Backend::Sqlite);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(
            settings.sync_options().retention,
            Duration::from_secs(365 * 24 * 60 * 60)
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "https://example.supabase.co"),
            (ENV_CACHE_DIR, "/tmp/runes"),
            (ENV_BACKEND, "Document"),
            (ENV_API_KEY, "  "),
        ]);
        let mut settings = Settings {
            api_key: "from-file".to_string(),
            ..Settings::default()
        };

        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.api_url, "https://example.supabase.co");
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/runes")));
        assert_eq!(settings.backend, Backend::Document);
        // Blank values do not override
        assert_eq!(settings.api_key, "from-file");
    }

    #[test]
    fn unknown_backend_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(|key| (key == ENV_BACKEND).then(|| "redis".to_string()));
        assert_eq!(settings.backend, Backend::Sqlite);
        assert!(matches!(
            "redis".parse::<Backend>(),
            Err(SettingsError::UnknownBackend(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            api_key: "anon".to_string(),
            backend: Backend::Document,
            retention_days: 30,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn partial_or_broken_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        std::fs::write(&path, r#"{"backend":"document"}"#).unwrap();
        let partial = Settings::load_from(&path);
        assert_eq!(partial.backend, Backend::Document);
        assert_eq!(partial.expected_total, TOTAL_RUNESTONES);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(
            Settings::load_from(&dir.path().join("missing.json")),
            Settings::default()
        );
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let settings = Settings {
            cache_dir: Some(PathBuf::from("/var/cache/runes")),
            ..Settings::default()
        };
        assert_eq!(settings.cache_dir().unwrap(), PathBuf::from("/var/cache/runes"));
    }
}
