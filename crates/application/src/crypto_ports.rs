use serde::{Deserialize, Serialize};
use tessera_core::AppResult;

/// Derived password hash with the parameters needed to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordHash {
    /// Base64 derived key.
    pub hash: String,
    /// Base64 salt.
    pub salt: String,
    /// Key-derivation rounds.
    pub iterations: u32,
    /// Algorithm label, for example `pbkdf2-sha256`.
    pub algorithm: String,
}

/// Port for password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password with a fresh random salt.
    fn hash_password(&self, password: &str) -> AppResult<PasswordHash>;

    /// Verifies a plaintext password against a stored hash.
    /// Must compare in constant time.
    fn verify_password(&self, password: &str, stored: &PasswordHash) -> AppResult<bool>;
}

/// Symmetric ciphertext with its nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Base64 ciphertext including the authentication tag.
    pub ciphertext: String,
    /// Base64 nonce, unique per encryption.
    pub iv: String,
    /// Algorithm label, for example `aes-256-gcm`.
    pub algorithm: String,
}

/// Port for authenticated symmetric encryption.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts with a fresh random nonce.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<EncryptedPayload>;

    /// Decrypts and authenticates a payload.
    fn decrypt(&self, payload: &EncryptedPayload) -> AppResult<Vec<u8>>;
}

/// Port for keyed message signatures.
pub trait MessageSigner: Send + Sync {
    /// Returns the hex signature of a message.
    fn sign(&self, message: &[u8]) -> AppResult<String>;

    /// Checks a hex signature in constant time.
    fn verify(&self, message: &[u8], signature: &str) -> AppResult<bool>;
}
