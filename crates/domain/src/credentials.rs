use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::user::{EmailAddress, password_issues};

/// Per-field validation messages keyed by form field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Login form payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCredentials {
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Requests a long-lived refresh token.
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginCredentials {
    /// Checks that both fields are filled and the email is well-formed.
    #[must_use]
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Err(error) = EmailAddress::new(self.email.as_str()) {
            push(&mut errors, "email", validation_message(&error));
        }
        if self.password.is_empty() {
            push(&mut errors, "password", "password is required".to_owned());
        }
        errors
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Registration form payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    /// Account email.
    pub email: String,
    /// Chosen password.
    pub password: String,
    /// Repeated password; never sent to the API.
    #[serde(skip_serializing)]
    pub confirm_password: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

impl RegistrationData {
    /// Collects every field error instead of stopping at the first.
    #[must_use]
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if let Err(error) = EmailAddress::new(self.email.as_str()) {
            push(&mut errors, "email", validation_message(&error));
        }

        for issue in password_issues(&self.password) {
            push(&mut errors, "password", issue);
        }

        if self.confirm_password != self.password {
            push(
                &mut errors,
                "confirmPassword",
                "passwords do not match".to_owned(),
            );
        }

        validate_name(&mut errors, "firstName", &self.first_name);
        validate_name(&mut errors, "lastName", &self.last_name);

        errors
    }
}

impl std::fmt::Debug for RegistrationData {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegistrationData")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Maximum length of a person name field.
pub const NAME_MAX_LENGTH: usize = 100;

fn validate_name(errors: &mut FieldErrors, field: &str, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        push(errors, field, "name is required".to_owned());
        return;
    }

    if trimmed.chars().count() > NAME_MAX_LENGTH {
        push(
            errors,
            field,
            format!("name must not exceed {NAME_MAX_LENGTH} characters"),
        );
    }

    if trimmed.chars().any(|value| matches!(value, '<' | '>')) {
        push(errors, field, "name contains invalid characters".to_owned());
    }
}

fn push(errors: &mut FieldErrors, field: &str, message: String) {
    errors.entry(field.to_owned()).or_default().push(message);
}

fn validation_message(error: &tessera_core::AppError) -> String {
    match error {
        tessera_core::AppError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Flattens field errors into one human-readable line.
#[must_use]
pub fn summarize_field_errors(errors: &FieldErrors) -> String {
    errors
        .values()
        .flatten()
        .cloned()
        .collect::<Vec<_>>()
        .join("; ")
}
