use std::sync::Arc;

use tessera_application::{
    AuthSessionService, CsrfService, InputSanitizer, PasswordHasher, PermissionService,
    RoleRepository, RoleService, SecretEncryptor, SessionStorage, XssDetector,
};
use tessera_core::{AppError, AppResult, Clock, SystemClock};
use tessera_domain::PermissionRegistry;
use tracing::info;

use crate::{
    AesGcmEncryptor, EncryptedSessionStorage, FileSessionStorage, HttpAuthApi,
    InMemoryRoleRepository, InMemorySessionStorage, Pbkdf2PasswordHasher, SecurityConfig,
};

/// Fully wired security layer.
///
/// Every field is a cheap handle; clones share the same state.
#[derive(Clone)]
pub struct SecurityContext {
    /// Session orchestration against the remote API.
    pub auth: AuthSessionService,
    /// Permission checks against the shared registry.
    pub permissions: PermissionService,
    /// Role registry and assignments.
    pub roles: RoleService,
    /// Anti-forgery token store.
    pub csrf: CsrfService,
    /// Form input cleaning.
    pub sanitizer: InputSanitizer,
    /// XSS heuristics.
    pub xss: XssDetector,
    /// Password hashing with the configured cost.
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl SecurityContext {
    /// Wires every service from configuration with the system clock.
    pub fn build(config: &SecurityConfig) -> AppResult<Self> {
        Self::build_with(
            config,
            Arc::new(SystemClock),
            Arc::new(InMemoryRoleRepository::new()),
        )
    }

    /// Wires every service with explicit clock and role repository.
    pub fn build_with(
        config: &SecurityConfig,
        clock: Arc<dyn Clock>,
        role_repository: Arc<dyn RoleRepository>,
    ) -> AppResult<Self> {
        let registry = Arc::new(PermissionRegistry::seeded()?);
        let permissions = PermissionService::new(registry.clone());

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
        let api = Arc::new(HttpAuthApi::new(
            http_client,
            config.api_base_url.clone(),
            clock.clone(),
        ));

        let auth = AuthSessionService::new(
            api,
            session_storage(config)?,
            clock.clone(),
            permissions.clone(),
            config.refresh_policy,
        );
        let roles = RoleService::new(role_repository, registry, clock.clone());
        let csrf = CsrfService::new(clock, config.csrf_token_ttl);
        let sanitizer = InputSanitizer::new()?;
        let xss = XssDetector::new(sanitizer.clone())?;
        let password_hasher = Arc::new(Pbkdf2PasswordHasher::new(
            config.password_hash_iterations,
            config.password_salt_length,
        )?);

        Ok(Self {
            auth,
            permissions,
            roles,
            csrf,
            sanitizer,
            xss,
            password_hasher,
        })
    }

    /// Builds the context, seeds system roles and restores a persisted session.
    pub async fn start(config: &SecurityConfig) -> AppResult<Self> {
        let context = Self::build(config)?;
        context.initialize().await?;
        Ok(context)
    }

    /// Seeds system roles and restores a persisted session.
    pub async fn initialize(&self) -> AppResult<()> {
        let seeded = self.roles.ensure_system_roles().await?;
        let restored = self.auth.restore().await?;
        info!(seeded_roles = seeded, session_restored = restored, "security context ready");
        Ok(())
    }
}

fn session_storage(config: &SecurityConfig) -> AppResult<Arc<dyn SessionStorage>> {
    let storage: Arc<dyn SessionStorage> = match &config.session_storage_path {
        Some(path) => Arc::new(FileSessionStorage::new(path.clone())),
        None => Arc::new(InMemorySessionStorage::new()),
    };

    let Some(key) = &config.session_encryption_key else {
        return Ok(storage);
    };

    let encryptor: Arc<dyn SecretEncryptor> = Arc::new(AesGcmEncryptor::from_hex(key)?);
    Ok(Arc::new(EncryptedSessionStorage::new(storage, encryptor)))
}
