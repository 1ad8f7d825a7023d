use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tessera_application::{DEFAULT_CSRF_TTL_MINUTES, RefreshPolicy};
use tessera_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::pbkdf2_password_hasher::{DEFAULT_PBKDF2_ITERATIONS, DEFAULT_SALT_LENGTH};

const DEFAULT_REFRESH_LEAD_SECONDS: i64 = 300;
const DEFAULT_REFRESH_MIN_DELAY_SECONDS: i64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;
const MAX_REFRESH_SECONDS: i64 = 24 * 60 * 60;
const MAX_CSRF_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Runtime settings for the security layer.
#[derive(Clone)]
pub struct SecurityConfig {
    /// Root of the remote authentication API.
    pub api_base_url: Url,
    /// Proactive token refresh timing.
    pub refresh_policy: RefreshPolicy,
    /// CSRF token lifetime.
    pub csrf_token_ttl: Duration,
    /// PBKDF2 iteration count for new hashes.
    pub password_hash_iterations: u32,
    /// PBKDF2 salt length in bytes.
    pub password_salt_length: usize,
    /// Session file; `None` keeps the session in memory.
    pub session_storage_path: Option<PathBuf>,
    /// Hex AES-256 key; `None` stores the session unencrypted.
    pub session_encryption_key: Option<String>,
    /// Timeout applied to every auth API call.
    pub http_timeout: StdDuration,
}

impl SecurityConfig {
    /// Loads the configuration from `.env` and the process environment.
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let api_base_url = required(&lookup, "AUTH_API_BASE_URL")?;
        let api_base_url = Url::parse(api_base_url.trim()).map_err(|error| {
            AppError::Validation(format!("invalid AUTH_API_BASE_URL '{api_base_url}': {error}"))
        })?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(AppError::Validation(
                "AUTH_API_BASE_URL must use http or https".to_owned(),
            ));
        }

        let lead_seconds = parse_or(
            &lookup,
            "AUTH_REFRESH_LEAD_SECONDS",
            DEFAULT_REFRESH_LEAD_SECONDS,
        )?;
        let min_delay_seconds = parse_or(
            &lookup,
            "AUTH_REFRESH_MIN_DELAY_SECONDS",
            DEFAULT_REFRESH_MIN_DELAY_SECONDS,
        )?;
        let refresh_policy = RefreshPolicy {
            lead_time: refresh_seconds("AUTH_REFRESH_LEAD_SECONDS", lead_seconds)?,
            min_delay: refresh_seconds("AUTH_REFRESH_MIN_DELAY_SECONDS", min_delay_seconds)?,
        };

        let csrf_ttl_minutes =
            parse_or(&lookup, "CSRF_TOKEN_TTL_MINUTES", DEFAULT_CSRF_TTL_MINUTES)?;
        if !(1..=MAX_CSRF_TTL_MINUTES).contains(&csrf_ttl_minutes) {
            return Err(AppError::Validation(format!(
                "CSRF_TOKEN_TTL_MINUTES must be between 1 and {MAX_CSRF_TTL_MINUTES}"
            )));
        }
        let csrf_token_ttl = Duration::minutes(csrf_ttl_minutes);

        let password_hash_iterations =
            parse_or(&lookup, "PASSWORD_HASH_ITERATIONS", DEFAULT_PBKDF2_ITERATIONS)?;
        let password_salt_length = parse_or(&lookup, "PASSWORD_SALT_LENGTH", DEFAULT_SALT_LENGTH)?;

        let session_storage_path = optional(&lookup, "SESSION_STORAGE_PATH").map(PathBuf::from);
        let session_encryption_key = optional(&lookup, "SESSION_ENCRYPTION_KEY");
        if let Some(key) = &session_encryption_key
            && (key.len() != 64 || !key.chars().all(|value| value.is_ascii_hexdigit()))
        {
            return Err(AppError::Validation(
                "SESSION_ENCRYPTION_KEY must be 64 hex characters".to_owned(),
            ));
        }

        let timeout_seconds = parse_or(
            &lookup,
            "HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?;
        if timeout_seconds == 0 {
            return Err(AppError::Validation(
                "HTTP_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            api_base_url,
            refresh_policy,
            csrf_token_ttl,
            password_hash_iterations,
            password_salt_length,
            session_storage_path,
            session_encryption_key,
            http_timeout: StdDuration::from_secs(timeout_seconds),
        })
    }
}

// The encryption key stays out of logs.
impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SecurityConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("refresh_policy", &self.refresh_policy)
            .field("csrf_token_ttl", &self.csrf_token_ttl)
            .field("password_hash_iterations", &self.password_hash_iterations)
            .field("password_salt_length", &self.password_salt_length)
            .field("session_storage_path", &self.session_storage_path)
            .field(
                "session_encryption_key",
                &self.session_encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() -> AppResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|error| AppError::Internal(format!("failed to install tracing: {error}")))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    optional(lookup, name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, name) {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn refresh_seconds(name: &str, seconds: i64) -> AppResult<Duration> {
    if !(0..=MAX_REFRESH_SECONDS).contains(&seconds) {
        return Err(AppError::Validation(format!(
            "{name} must be between 0 and {MAX_REFRESH_SECONDS} seconds"
        )));
    }

    Ok(Duration::seconds(seconds))
}
