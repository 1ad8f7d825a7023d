use async_trait::async_trait;
use tessera_core::AppResult;
use tessera_domain::{AuthTokens, AuthUser, LoginCredentials, RegistrationData};

/// Storage key holding the JSON-serialized user.
pub const AUTH_USER_STORAGE_KEY: &str = "auth_user";

/// Storage key holding the JSON-serialized token pair.
pub const AUTH_TOKENS_STORAGE_KEY: &str = "auth_tokens";

/// Successful login or registration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    /// Authenticated user.
    pub user: AuthUser,
    /// Issued tokens.
    pub tokens: AuthTokens,
}

/// Successful refresh payload; the API may omit the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshResponse {
    /// Updated user, when the API returns one.
    pub user: Option<AuthUser>,
    /// Replacement tokens.
    pub tokens: AuthTokens,
}

/// Port for the remote authentication API.
///
/// Implementations map HTTP 401 to `AppError::Unauthorized` and transport
/// failures to `AppError::Network`.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, credentials: &LoginCredentials) -> AppResult<AuthResponse>;

    /// `POST /auth/register`.
    async fn register(&self, data: &RegistrationData) -> AppResult<AuthResponse>;

    /// `POST /auth/logout` with the current bearer token.
    async fn logout(&self, tokens: &AuthTokens) -> AppResult<()>;

    /// `POST /auth/refresh`.
    async fn refresh(&self, refresh_token: &str) -> AppResult<RefreshResponse>;

    /// `POST /auth/forgot-password`.
    async fn forgot_password(&self, email: &str) -> AppResult<()>;

    /// `POST /auth/reset-password`.
    async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()>;
}

/// Port for the key/value store that persists the session between runs.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Reads a value.
    async fn read(&self, key: &str) -> AppResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn write(&self, key: &str, value: &str) -> AppResult<()>;

    /// Removes a value; removing a missing key is not an error.
    async fn remove(&self, key: &str) -> AppResult<()>;
}
