//! PBKDF2-HMAC-SHA256 password hasher.
//!
//! Defaults follow the OWASP Password Storage cheat sheet floor for
//! PBKDF2-SHA256 deployments that predate Argon2 adoption: 100 000 rounds,
//! a 16-byte random salt and a 32-byte derived key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tessera_application::{PasswordHash, PasswordHasher};
use tessera_core::{AppError, AppResult, constant_time_eq};

/// Algorithm label stored alongside each hash.
pub const PBKDF2_ALGORITHM: &str = "pbkdf2-sha256";

/// Default iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Default salt length in bytes.
pub const DEFAULT_SALT_LENGTH: usize = 16;

const DERIVED_KEY_LENGTH: usize = 32;
const MIN_ITERATIONS: u32 = 1_000;
const MIN_SALT_LENGTH: usize = 8;
const MAX_SALT_LENGTH: usize = 64;

/// PBKDF2 hasher with configurable cost.
#[derive(Debug, Clone)]
pub struct Pbkdf2PasswordHasher {
    iterations: u32,
    salt_length: usize,
}

impl Pbkdf2PasswordHasher {
    /// Creates a hasher; rejects parameters too weak to be useful.
    pub fn new(iterations: u32, salt_length: usize) -> AppResult<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(AppError::Validation(format!(
                "PBKDF2 iterations must be at least {MIN_ITERATIONS}"
            )));
        }

        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&salt_length) {
            return Err(AppError::Validation(format!(
                "salt length must be between {MIN_SALT_LENGTH} and {MAX_SALT_LENGTH} bytes"
            )));
        }

        Ok(Self {
            iterations,
            salt_length,
        })
    }
}

impl Default for Pbkdf2PasswordHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
            salt_length: DEFAULT_SALT_LENGTH,
        }
    }
}

impl PasswordHasher for Pbkdf2PasswordHasher {
    fn hash_password(&self, password: &str) -> AppResult<PasswordHash> {
        let mut salt = vec![0u8; self.salt_length];
        getrandom::fill(&mut salt)
            .map_err(|error| AppError::Internal(format!("failed to generate salt: {error}")))?;

        let mut derived = [0u8; DERIVED_KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, self.iterations, &mut derived);

        Ok(PasswordHash {
            hash: STANDARD.encode(derived),
            salt: STANDARD.encode(&salt),
            iterations: self.iterations,
            algorithm: PBKDF2_ALGORITHM.to_owned(),
        })
    }

    fn verify_password(&self, password: &str, stored: &PasswordHash) -> AppResult<bool> {
        if stored.algorithm != PBKDF2_ALGORITHM {
            return Err(AppError::Validation(format!(
                "unsupported password hash algorithm '{}'",
                stored.algorithm
            )));
        }

        if stored.iterations == 0 {
            return Err(AppError::Validation(
                "stored password hash has zero iterations".to_owned(),
            ));
        }

        let salt = STANDARD.decode(&stored.salt).map_err(|error| {
            AppError::Internal(format!("failed to decode password salt: {error}"))
        })?;
        let expected = STANDARD.decode(&stored.hash).map_err(|error| {
            AppError::Internal(format!("failed to decode password hash: {error}"))
        })?;
        if expected.is_empty() {
            return Err(AppError::Internal("stored password hash is empty".to_owned()));
        }

        // Stored parameters win over the current configuration so old hashes keep verifying.
        let mut derived = vec![0u8; expected.len()];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, stored.iterations, &mut derived);

        Ok(constant_time_eq(&derived, &expected))
    }
}
