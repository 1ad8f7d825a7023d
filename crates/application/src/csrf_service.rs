use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use http::Method;
use tessera_core::{AppError, AppResult, Clock, constant_time_eq};
use tessera_domain::AccessDecision;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default lifetime of a CSRF token.
pub const DEFAULT_CSRF_TTL_MINUTES: i64 = 60;

const CSRF_TOKEN_BYTES: usize = 32;

/// Issued anti-forgery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    /// Hex-encoded random value.
    pub token: String,
    /// Issue time.
    pub timestamp: DateTime<Utc>,
    /// Last instant at which the token is accepted.
    pub expiry: DateTime<Utc>,
}

impl CsrfToken {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }
}

/// In-memory CSRF token store.
///
/// Tokens are keyed by session id, or by the token itself when issued
/// without a session. A new token for the same session replaces the old one.
#[derive(Clone)]
pub struct CsrfService {
    tokens: Arc<RwLock<HashMap<String, CsrfToken>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl CsrfService {
    /// Creates an empty store issuing tokens with the given lifetime.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            clock,
            ttl,
        }
    }

    /// Issues and stores a fresh token.
    ///
    /// Expired entries are dropped on every issue, so tokens that are never
    /// submitted do not accumulate.
    pub async fn generate_token(&self, session_id: Option<&str>) -> AppResult<CsrfToken> {
        let token = random_token()?;
        let now = self.clock.now();
        let expiry = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AppError::Validation("csrf token lifetime is out of range".to_owned())
        })?;
        let issued = CsrfToken {
            token: token.clone(),
            timestamp: now,
            expiry,
        };

        let key = session_id.map_or(token, str::to_owned);
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, stored| !stored.is_expired_at(now));
        tokens.insert(key, issued.clone());
        debug!(
            has_session = session_id.is_some(),
            stored = tokens.len(),
            "csrf token issued"
        );

        Ok(issued)
    }

    /// Checks a submitted token against the stored one.
    ///
    /// Expired entries are evicted when found.
    pub async fn validate_token(&self, token: Option<&str>, session_id: Option<&str>) -> bool {
        let Some(token) = token.filter(|value| !value.is_empty()) else {
            return false;
        };
        let key = session_id.unwrap_or(token);
        let now = self.clock.now();

        let stored = self.tokens.read().await.get(key).cloned();
        let Some(stored) = stored else {
            return false;
        };

        if stored.is_expired_at(now) {
            let mut tokens = self.tokens.write().await;
            if tokens.get(key).is_some_and(|current| current.is_expired_at(now)) {
                tokens.remove(key);
            }
            return false;
        }

        constant_time_eq(stored.token.as_bytes(), token.as_bytes())
    }

    /// Returns whether requests with this method must carry a token.
    #[must_use]
    pub fn requires_validation(method: &Method) -> bool {
        !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Decides whether a request passes CSRF protection.
    pub async fn protect_request(
        &self,
        method: &Method,
        token: Option<&str>,
        session_id: Option<&str>,
    ) -> AccessDecision {
        if !Self::requires_validation(method) {
            return AccessDecision::granted();
        }

        if token.is_none_or(str::is_empty) {
            warn!(method = %method, "request rejected: missing csrf token");
            return AccessDecision::denied("missing CSRF token");
        }

        if self.validate_token(token, session_id).await {
            AccessDecision::granted()
        } else {
            warn!(method = %method, "request rejected: invalid csrf token");
            AccessDecision::denied("invalid or expired CSRF token")
        }
    }

    /// Drops every expired token; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, stored| !stored.is_expired_at(now));
        let removed = before - tokens.len();

        if removed > 0 {
            debug!(removed, "expired csrf tokens purged");
        }

        removed
    }
}

fn random_token() -> AppResult<String> {
    use std::fmt::Write;

    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate csrf token: {error}")))?;

    Ok(bytes
        .iter()
        .fold(String::with_capacity(CSRF_TOKEN_BYTES * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        }))
}
