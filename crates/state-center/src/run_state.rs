use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sword_core_types::RunConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run state I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("run state is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// What survives a page reload: whether a run was active and with which config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRun {
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RunConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedRun {
    pub fn running(config: RunConfig) -> Self {
        Self {
            running: true,
            config: Some(config),
            updated_at: Some(Utc::now()),
        }
    }

    /// The run ended; the config is kept so a later visit can offer it again.
    pub fn stopped(config: Option<RunConfig>) -> Self {
        Self {
            running: false,
            config,
            updated_at: Some(Utc::now()),
        }
    }
}

#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedRun>, StoreError>;
    async fn save(&self, state: &PersistedRun) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileRunStateStore {
    path: PathBuf,
}

impl FileRunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RunStateStore for FileRunStateStore {
    async fn load(&self) -> Result<Option<PersistedRun>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, state: &PersistedRun) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRunStateStore {
    state: Mutex<Option<PersistedRun>>,
}

impl InMemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self) -> Option<PersistedRun> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl RunStateStore for InMemoryRunStateStore {
    async fn load(&self) -> Result<Option<PersistedRun>, StoreError> {
        Ok(self.peek())
    }

    async fn save(&self, state: &PersistedRun) -> Result<(), StoreError> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.state.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRunStateStore::new(dir.path().join("nested/run.json"));
        assert!(store.load().await.unwrap().is_none());

        store
            .save(&PersistedRun::running(RunConfig::with_seats(2)))
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.running);
        assert_eq!(loaded.config.map(|c| c.seat_count), Some(2));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileRunStateStore::new(path);
        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn memory_store_keeps_config_when_stopped() {
        let store = InMemoryRunStateStore::new();
        store
            .save(&PersistedRun::stopped(Some(RunConfig::default())))
            .await
            .unwrap();
        let state = store.peek().unwrap();
        assert!(!state.running);
        assert!(state.config.is_some());
    }
}
