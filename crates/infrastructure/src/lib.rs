//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_gcm_encryptor;
mod bootstrap;
mod config;
mod csrf_middleware;
mod encrypted_session_storage;
mod file_session_storage;
mod hmac_signer;
mod http_auth_api;
mod in_memory_role_repository;
mod in_memory_session_storage;
mod pbkdf2_password_hasher;

pub use aes_gcm_encryptor::{AES_GCM_ALGORITHM, AesGcmEncryptor};
pub use bootstrap::SecurityContext;
pub use config::{SecurityConfig, init_tracing};
pub use csrf_middleware::{
    CSRF_TOKEN_HEADER, CsrfErrorResponse, SESSION_ID_HEADER, require_csrf_token,
};
pub use encrypted_session_storage::EncryptedSessionStorage;
pub use file_session_storage::FileSessionStorage;
pub use hmac_signer::HmacSha256Signer;
pub use http_auth_api::HttpAuthApi;
pub use in_memory_role_repository::InMemoryRoleRepository;
pub use in_memory_session_storage::InMemorySessionStorage;
pub use pbkdf2_password_hasher::{
    DEFAULT_PBKDF2_ITERATIONS, DEFAULT_SALT_LENGTH, PBKDF2_ALGORITHM, Pbkdf2PasswordHasher,
};
