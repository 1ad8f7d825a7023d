use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tessera_application::SessionStorage;
use tessera_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::warn;

/// Session storage backed by one JSON object file.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so readers never observe a half-written document.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    /// Creates a storage for the given file; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AppResult<BTreeMap<String, String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(error) => {
                return Err(AppError::Internal(format!(
                    "failed to read session file '{}': {error}",
                    self.path.display()
                )));
            }
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&contents) {
            Ok(values) => Ok(values),
            Err(error) => {
                // A corrupt file is treated as an empty session rather than a hard failure.
                warn!(path = %self.path.display(), %error, "discarding unreadable session file");
                Ok(BTreeMap::new())
            }
        }
    }

    async fn store(&self, values: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to create session directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        let contents = serde_json::to_vec_pretty(values).map_err(|error| {
            AppError::Internal(format!("failed to serialize session file: {error}"))
        })?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to write session file '{}': {error}",
                temp_path.display()
            ))
        })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to replace session file '{}': {error}",
                    self.path.display()
                ))
            })
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn read(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn write(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_owned(), value.to_owned());
        self.store(&values).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.store(&values).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn values_survive_a_new_instance() -> AppResult<()> {
        let dir = temp_dir();
        let path = dir.path().join("session").join("store.json");

        let storage = FileSessionStorage::new(&path);
        storage.write("auth_user", "{\"id\":\"u-1\"}").await?;
        storage.write("auth_tokens", "{}").await?;

        let reopened = FileSessionStorage::new(&path);
        assert_eq!(
            reopened.read("auth_user").await?.as_deref(),
            Some("{\"id\":\"u-1\"}")
        );
        assert_eq!(reopened.read("auth_tokens").await?.as_deref(), Some("{}"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() -> AppResult<()> {
        let dir = temp_dir();
        let storage = FileSessionStorage::new(dir.path().join("absent.json"));

        assert_eq!(storage.read("auth_user").await?, None);
        storage.remove("auth_user").await?;
        assert!(!storage.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn remove_deletes_only_the_key() -> AppResult<()> {
        let dir = temp_dir();
        let storage = FileSessionStorage::new(dir.path().join("store.json"));
        storage.write("auth_user", "user").await?;
        storage.write("auth_tokens", "tokens").await?;

        storage.remove("auth_tokens").await?;

        assert_eq!(storage.read("auth_tokens").await?, None);
        assert_eq!(storage.read("auth_user").await?.as_deref(), Some("user"));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_empty() -> AppResult<()> {
        let dir = temp_dir();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, "{not json")
            .await
            .map_err(|error| AppError::Internal(error.to_string()))?;

        let storage = FileSessionStorage::new(&path);
        assert_eq!(storage.read("auth_user").await?, None);

        storage.write("auth_user", "user").await?;
        assert_eq!(storage.read("auth_user").await?.as_deref(), Some("user"));
        Ok(())
    }
}
