use std::sync::Arc;

use async_trait::async_trait;
use tessera_application::{EncryptedPayload, SecretEncryptor, SessionStorage};
use tessera_core::{AppError, AppResult};
use tracing::warn;

/// Storage decorator that encrypts every value before it reaches the inner storage.
///
/// Values that no longer decrypt, for example after a key rotation, read as
/// absent so the session manager treats them like a signed-out state.
pub struct EncryptedSessionStorage {
    inner: Arc<dyn SessionStorage>,
    encryptor: Arc<dyn SecretEncryptor>,
}

impl EncryptedSessionStorage {
    /// Wraps a storage with an encryptor.
    #[must_use]
    pub fn new(inner: Arc<dyn SessionStorage>, encryptor: Arc<dyn SecretEncryptor>) -> Self {
        Self { inner, encryptor }
    }

    fn open(&self, key: &str, sealed: &str) -> Option<String> {
        let payload: EncryptedPayload = match serde_json::from_str(sealed) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(key, %error, "stored session value is not an encrypted payload");
                return None;
            }
        };

        let plaintext = match self.encryptor.decrypt(&payload) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                warn!(key, %error, "stored session value could not be decrypted");
                return None;
            }
        };

        String::from_utf8(plaintext)
            .inspect_err(|_| warn!(key, "decrypted session value is not valid UTF-8"))
            .ok()
    }
}

#[async_trait]
impl SessionStorage for EncryptedSessionStorage {
    async fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .inner
            .read(key)
            .await?
            .and_then(|sealed| self.open(key, &sealed)))
    }

    async fn write(&self, key: &str, value: &str) -> AppResult<()> {
        let payload = self.encryptor.encrypt(value.as_bytes())?;
        let sealed = serde_json::to_string(&payload).map_err(|error| {
            AppError::Internal(format!("failed to serialize encrypted payload: {error}"))
        })?;

        self.inner.write(key, &sealed).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.inner.remove(key).await
    }
}
