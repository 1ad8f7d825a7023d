//! Application services and ports.

#![forbid(unsafe_code)]

mod auth_ports;
mod auth_session_service;
mod crypto_ports;
mod csrf_service;
mod input_sanitizer;
mod permission_service;
mod role_ports;
mod role_service;
mod xss_detector;

pub use auth_ports::{
    AUTH_TOKENS_STORAGE_KEY, AUTH_USER_STORAGE_KEY, AuthApi, AuthResponse, RefreshResponse,
    SessionStorage,
};
pub use auth_session_service::{
    AuthActionOutcome, AuthSessionService, RefreshPolicy, SESSION_EXPIRED_MESSAGE,
};
pub use crypto_ports::{EncryptedPayload, MessageSigner, PasswordHash, PasswordHasher, SecretEncryptor};
pub use csrf_service::{CsrfService, CsrfToken, DEFAULT_CSRF_TTL_MINUTES};
pub use input_sanitizer::{
    InputSanitizer, MAX_FILENAME_LENGTH, SanitizeKind, escape_html, sanitize_database,
    sanitize_filename, sanitize_url,
};
pub use permission_service::PermissionService;
pub use role_ports::{AssignRoleInput, CreateRoleInput, RoleRepository, UpdateRoleInput};
pub use role_service::{RoleService, SYSTEM_ACTOR};
pub use xss_detector::{
    ThreatSeverity, XssDetectionConfig, XssDetector, XssReport, XssThreat,
};
