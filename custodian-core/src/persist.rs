//! Settings persistence.
//!
//! The extension only sees the [`SettingsStore`] trait; the host decides
//! where settings live. [`JsonFileStore`] is the file-backed store used by
//! the headless driver.

use crate::settings::Settings;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Host-provided settings storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load stored settings. `Ok(None)` means nothing has been stored yet.
    async fn load(&self) -> Result<Option<Settings>, PersistError>;

    /// Store a full settings snapshot.
    async fn save(&self, settings: &Settings) -> Result<(), PersistError>;
}

/// Settings kept as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Settings>, PersistError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(Some(settings))
    }

    async fn save(&self, settings: &Settings) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        let temp = self.temp_path();
        fs::write(&temp, content).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Settings file location: `$CUSTODIAN_SETTINGS`, else `custodian/settings.json`.
pub fn default_settings_path() -> PathBuf {
    std::env::var_os("CUSTODIAN_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new("custodian").join("settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsEdit;
    use crate::stats::StatKey;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("absent.json"));
        assert!(store.load().await.expect("Load should succeed").is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("nested/dir/settings.json"));

        let mut settings = Settings::default();
        SettingsEdit::SetStat(StatKey::Experience, "250".to_string()).apply(&mut settings);
        SettingsEdit::SetInventory("lockpick, cloak".to_string()).apply(&mut settings);

        store.save(&settings).await.expect("Save should succeed");
        assert!(store.path().exists());
        assert!(!store.temp_path().exists());

        let loaded = store
            .load()
            .await
            .expect("Load should succeed")
            .expect("Settings should exist");
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_repeated_noop_saves_do_not_drift() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = JsonFileStore::new(temp_dir.path().join("settings.json"));
        store.save(&Settings::default()).await.expect("Save should succeed");

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            let loaded = store.load().await.unwrap().unwrap();
            store.save(&loaded).await.unwrap();
            snapshots.push(std::fs::read_to_string(store.path()).unwrap());
        }
        assert_eq!(snapshots[0], snapshots[1]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load().await, Err(PersistError::Json(_))));
    }
}
