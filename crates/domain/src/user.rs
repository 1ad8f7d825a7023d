//! User identity types and credential rules.
//!
//! Password rules follow the OWASP Authentication cheat sheet: bounded
//! length, mixed character classes and a breached-password denylist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};

use crate::role::RoleRef;

/// Authenticated user as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Stable user identifier.
    pub id: String,
    /// Account email.
    pub email: String,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Roles by reference or hydrated.
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Direct permission grants.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Inactive accounts are denied every permission.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    /// Last profile change.
    pub updated_at: DateTime<Utc>,
    /// Last successful login, if the API reports it.
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl AuthUser {
    /// Returns whether a role with the given id or name is attached.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|value| value.name() == role)
    }

    /// Returns whether the permission id is a direct grant.
    #[must_use]
    pub fn has_direct_permission(&self, permission_id: &str) -> bool {
        self.permissions.iter().any(|value| value == permission_id)
    }

    /// Returns "first last", falling back to the email.
    #[must_use]
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();

        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// Validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    ///
    /// Performs basic structural validation: non-empty, contains exactly one `@`,
    /// local part and domain are non-empty, domain contains at least one `.`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        if trimmed.is_empty() {
            return Err(AppError::Validation("email is required".to_owned()));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        };

        if domain.contains('@') {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        }

        if local.is_empty() {
            return Err(AppError::Validation(
                "email local part must not be empty".to_owned(),
            ));
        }

        if domain.is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return Err(AppError::Validation(
                "email domain must contain at least one '.'".to_owned(),
            ));
        }

        if trimmed.len() > 254 {
            return Err(AppError::Validation(
                "email address must not exceed 254 characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// Minimum password length.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum password length; bounds PBKDF2 work on hostile input.
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Lists every rule the password breaks, in a stable order.
#[must_use]
pub fn password_issues(password: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let char_count = password.chars().count();

    if char_count < PASSWORD_MIN_LENGTH {
        issues.push(format!(
            "password must be at least {PASSWORD_MIN_LENGTH} characters"
        ));
    }

    if char_count > PASSWORD_MAX_LENGTH {
        issues.push(format!(
            "password must not exceed {PASSWORD_MAX_LENGTH} characters"
        ));
    }

    if !password.chars().any(char::is_lowercase) {
        issues.push("password must contain a lowercase letter".to_owned());
    }

    if !password.chars().any(char::is_uppercase) {
        issues.push("password must contain an uppercase letter".to_owned());
    }

    if !password.chars().any(|value| value.is_ascii_digit()) {
        issues.push("password must contain a digit".to_owned());
    }

    if password.chars().all(char::is_alphanumeric) {
        issues.push("password must contain a special character".to_owned());
    }

    if is_common_password(password) {
        issues.push("this password is too common and has appeared in data breaches".to_owned());
    }

    issues
}

/// Validates a plaintext password, reporting the first broken rule.
pub fn validate_password(password: &str) -> AppResult<()> {
    match password_issues(password).into_iter().next() {
        Some(issue) => Err(AppError::Validation(issue)),
        None => Ok(()),
    }
}

fn is_common_password(password: &str) -> bool {
    let lowered = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|entry| *entry == lowered)
}

/// Top breached passwords (subset for fast embedded check).
static COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password1!",
    "password123",
    "password123!",
    "p@ssw0rd",
    "p@ssw0rd1",
    "passw0rd!",
    "qwerty123!",
    "welcome1!",
    "welcome123!",
    "admin123!",
    "letmein1!",
    "iloveyou1!",
    "changeme1!",
    "summer2024!",
    "winter2024!",
    "abc12345!",
    "12345678",
    "qwertyuiop",
];
