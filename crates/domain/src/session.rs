use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::AuthUser;

/// Default token type for authorization headers.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Access and refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Access token expiry, serialized as RFC3339.
    pub expires_at: DateTime<Utc>,
    /// Authorization scheme, usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_owned()
}

impl AuthTokens {
    /// Returns whether the access token has expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

// Token values stay out of logs.
impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// User and tokens of an established session; never one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Authenticated user.
    pub user: AuthUser,
    /// Tokens issued for the user.
    pub tokens: AuthTokens,
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    identity: Option<SessionIdentity>,
    is_loading: bool,
    error: Option<String>,
}

impl SessionState {
    /// Empty, idle session.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Established session with no pending work.
    #[must_use]
    pub fn authenticated(identity: SessionIdentity) -> Self {
        Self {
            identity: Some(identity),
            is_loading: false,
            error: None,
        }
    }

    /// Returns the identity, if authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    /// Returns the user, if authenticated.
    #[must_use]
    pub fn user(&self) -> Option<&AuthUser> {
        self.identity.as_ref().map(|identity| &identity.user)
    }

    /// Returns the tokens, if authenticated.
    #[must_use]
    pub fn tokens(&self) -> Option<&AuthTokens> {
        self.identity.as_ref().map(|identity| &identity.tokens)
    }

    /// Returns whether a user and tokens are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Returns whether an auth operation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Returns the last user-facing error.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Marks an operation as started and clears the previous error.
    pub fn begin_loading(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    /// Marks an operation as failed, keeping the identity untouched.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.is_loading = false;
        self.error = Some(message.into());
    }

    /// Ends an operation without changing identity or error.
    pub fn finish_loading(&mut self) {
        self.is_loading = false;
    }
}
