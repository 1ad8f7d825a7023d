use std::collections::HashMap;

use async_trait::async_trait;
use tessera_application::SessionStorage;
use tessera_core::AppResult;
use tokio::sync::RwLock;

/// In-memory session storage; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_remove() -> AppResult<()> {
        let storage = InMemorySessionStorage::new();

        assert_eq!(storage.read("auth_user").await?, None);
        storage.write("auth_user", "{\"id\":\"u-1\"}").await?;
        storage.write("auth_user", "{\"id\":\"u-2\"}").await?;
        assert_eq!(
            storage.read("auth_user").await?.as_deref(),
            Some("{\"id\":\"u-2\"}")
        );

        storage.remove("auth_user").await?;
        storage.remove("auth_user").await?;
        assert_eq!(storage.read("auth_user").await?, None);
        Ok(())
    }
}
