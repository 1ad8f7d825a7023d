//! Shared primitives for all Tessera crates.

#![forbid(unsafe_code)]

/// Time sources used by expiry-sensitive services.
pub mod clock;
/// Comparison helpers for secret material.
pub mod secure_compare;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use secure_compare::constant_time_eq;

/// Result type used across Tessera crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated or its credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Remote service could not be reached or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the error means the current credentials are no longer accepted.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn only_unauthorized_counts_as_authentication_failure() {
        assert!(AppError::Unauthorized("expired".to_owned()).is_authentication_failure());
        assert!(!AppError::Network("timeout".to_owned()).is_authentication_failure());
        assert!(!AppError::Forbidden("nope".to_owned()).is_authentication_failure());
    }
}
