//! AES-256-GCM encryptor for values at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tessera_application::{EncryptedPayload, SecretEncryptor};
use tessera_core::{AppError, AppResult};

/// Algorithm label stored in each payload.
pub const AES_GCM_ALGORITHM: &str = "aes-256-gcm";

const NONCE_LENGTH: usize = 12;

/// AES-256-GCM encryptor with a fresh random nonce per call.
#[derive(Clone)]
pub struct AesGcmEncryptor {
    cipher: Aes256Gcm,
}

impl AesGcmEncryptor {
    /// Creates a new encryptor from a 32-byte key.
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key_bytes.into());
        Self { cipher }
    }

    /// Creates a new encryptor from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim()).map_err(|error| {
            AppError::Validation(format!("invalid SESSION_ENCRYPTION_KEY hex: {error}"))
        })?;

        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Validation(
                "SESSION_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars)".to_owned(),
            )
        })?;

        Ok(Self::new(&key))
    }
}

impl SecretEncryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<EncryptedPayload> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|error| AppError::Internal(format!("failed to encrypt value: {error}")))?;

        Ok(EncryptedPayload {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(nonce),
            algorithm: AES_GCM_ALGORITHM.to_owned(),
        })
    }

    fn decrypt(&self, payload: &EncryptedPayload) -> AppResult<Vec<u8>> {
        if payload.algorithm != AES_GCM_ALGORITHM {
            return Err(AppError::Validation(format!(
                "unsupported encryption algorithm '{}'",
                payload.algorithm
            )));
        }

        let nonce_bytes = STANDARD
            .decode(&payload.iv)
            .map_err(|error| AppError::Internal(format!("failed to decode nonce: {error}")))?;
        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| AppError::Internal("nonce must be exactly 12 bytes".to_owned()))?;
        let nonce = Nonce::from(nonce_array);

        let ciphertext = STANDARD.decode(&payload.ciphertext).map_err(|error| {
            AppError::Internal(format!("failed to decode ciphertext: {error}"))
        })?;

        self.cipher
            .decrypt(&nonce, ciphertext.as_slice())
            .map_err(|error| AppError::Internal(format!("failed to decrypt value: {error}")))
    }
}
