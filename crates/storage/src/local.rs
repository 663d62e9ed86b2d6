//! Guest progress kept on the learner's device as a single JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use raccoon_core::model::GuestProgress;

use crate::repository::{GuestProgressStore, StorageError};

#[derive(Debug, Clone)]
pub struct JsonFileGuestStore {
    path: PathBuf,
}

impl JsonFileGuestStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_err(e: &std::io::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl GuestProgressStore for JsonFileGuestStore {
    async fn load_guest(&self) -> Result<Option<GuestProgress>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let guest: GuestProgress = serde_json::from_str(&content)
                    .map_err(|e| StorageError::Serialization(format!("guest file: {e}")))?;
                tracing::debug!(path = %self.path.display(), session = %guest.session_id, "loaded guest progress");
                Ok(Some(guest))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&e)),
        }
    }

    async fn save_guest(&self, guest: &GuestProgress) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(&e))?;
        }
        let json = serde_json::to_string_pretty(guest)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written file.
        let staging = self.staging_path();
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| io_err(&e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| io_err(&e))?;
        Ok(())
    }

    async fn clear_guest(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "cleared guest progress");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raccoon_core::model::GuestSessionId;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("raccoon-guest-{}", GuestSessionId::generate()))
            .join("guest.json")
    }

    #[tokio::test]
    async fn missing_file_means_no_guest() {
        let store = JsonFileGuestStore::new(scratch_path());
        assert!(store.load_guest().await.unwrap().is_none());
        store.clear_guest().await.unwrap();
    }

    #[tokio::test]
    async fn save_load_clear() {
        let path = scratch_path();
        let store = JsonFileGuestStore::new(&path);
        let guest = GuestProgress::start();

        store.save_guest(&guest).await.unwrap();
        assert_eq!(store.load_guest().await.unwrap(), Some(guest));

        store.clear_guest().await.unwrap();
        assert!(store.load_guest().await.unwrap().is_none());
        assert!(!path.exists());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileGuestStore::new(&path);
        let err = store.load_guest().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
