//! Session lifecycle: sign-in, sign-out, persistence and proactive refresh.
//!
//! The service owns the only copy of the session state. Callers read it
//! through synchronous getters or watch it through [`AuthSessionService::subscribe`].
//! Every sign-out bumps a session epoch; results of calls that started under
//! an older epoch are discarded so a logout can never be undone by an
//! in-flight login or refresh. Every installed identity bumps a generation,
//! which a refresh checks so it only ever replaces or ends the session it
//! started from.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tessera_core::{AppError, Clock};
use tessera_domain::{
    AuthTokens, AuthUser, EmailAddress, FieldErrors, LoginCredentials, RegistrationData,
    SessionIdentity, SessionState, password_issues, summarize_field_errors,
};
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::auth_ports::{AuthApi, AuthResponse, SessionStorage};
use crate::permission_service::PermissionService;

mod persistence;
mod refresh;

pub use refresh::RefreshPolicy;

use refresh::ScheduledRefresh;

/// Message shown when the session ends without the user asking for it.
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

/// Result of a user-triggered auth action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthActionOutcome {
    /// Whether the action succeeded.
    pub success: bool,
    /// Short user-facing error.
    pub error: Option<String>,
    /// Local validation errors by field; empty when the API was called.
    pub field_errors: FieldErrors,
}

impl AuthActionOutcome {
    fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            field_errors: FieldErrors::new(),
        }
    }

    fn invalid(field_errors: FieldErrors) -> Self {
        Self {
            success: false,
            error: Some(summarize_field_errors(&field_errors)),
            field_errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAction {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
}

impl AuthAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::ForgotPassword => "forgot_password",
            Self::ResetPassword => "reset_password",
        }
    }

    fn user_message(self, error: &AppError) -> String {
        match (self, error) {
            (_, AppError::Network(_)) => "Network error, please try again".to_owned(),
            (_, AppError::Validation(message) | AppError::Conflict(message)) => message.clone(),
            (Self::Login, AppError::Unauthorized(_)) => "Invalid email or password".to_owned(),
            (Self::ResetPassword, AppError::Unauthorized(_) | AppError::NotFound(_)) => {
                "Reset link is invalid or has expired".to_owned()
            }
            (Self::Login, _) => "Login failed".to_owned(),
            (Self::Register, _) => "Registration failed".to_owned(),
            (Self::ForgotPassword, _) => "Password reset request failed".to_owned(),
            (Self::ResetPassword, _) => "Password reset failed".to_owned(),
        }
    }
}

/// Orchestrates authentication against the remote API.
#[derive(Clone)]
pub struct AuthSessionService {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    permissions: PermissionService,
    policy: RefreshPolicy,
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
    generation: AtomicU64,
    // Serializes identity installs against each other.
    install: Mutex<()>,
    refresh_timer: Mutex<Option<ScheduledRefresh>>,
    timer_sequence: AtomicU64,
}

impl AuthSessionService {
    /// Creates a signed-out session service.
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
        permissions: PermissionService,
        policy: RefreshPolicy,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::signed_out());

        Self {
            inner: Arc::new(SessionInner {
                api,
                storage,
                clock,
                permissions,
                policy,
                state,
                epoch: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                install: Mutex::new(()),
                refresh_timer: Mutex::new(None),
                timer_sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a receiver that always holds the latest session state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Returns a copy of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Returns the signed-in user.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().user().cloned()
    }

    /// Returns whether a user and tokens are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Returns whether the signed-in user carries the role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        let state = self.inner.state.borrow();
        self.inner.permissions.has_role(state.user(), role)
    }

    /// Returns whether the signed-in user holds the permission.
    #[must_use]
    pub fn has_permission(&self, permission_id: &str) -> bool {
        let state = self.inner.state.borrow();
        self.inner
            .permissions
            .check_permission(permission_id, state.user())
            .granted
    }

    /// Returns the current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .tokens()
            .map(|tokens| tokens.access_token.clone())
    }

    /// Returns the `Authorization` header value for API calls.
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .tokens()
            .map(AuthTokens::authorization_header)
    }

    /// Signs in with email and password.
    pub async fn login(&self, credentials: LoginCredentials) -> AuthActionOutcome {
        let field_errors = credentials.validate();
        if !field_errors.is_empty() {
            return self.reject_invalid(field_errors);
        }

        let epoch = self.current_epoch();
        self.inner.state.send_modify(SessionState::begin_loading);

        match self.inner.api.login(&credentials).await {
            Ok(response) => self.complete_sign_in(AuthAction::Login, response, epoch).await,
            Err(error) => self.fail_action(AuthAction::Login, &error),
        }
    }

    /// Creates an account and signs in.
    pub async fn register(&self, data: RegistrationData) -> AuthActionOutcome {
        let field_errors = data.validate();
        if !field_errors.is_empty() {
            return self.reject_invalid(field_errors);
        }

        let epoch = self.current_epoch();
        self.inner.state.send_modify(SessionState::begin_loading);

        match self.inner.api.register(&data).await {
            Ok(response) => {
                self.complete_sign_in(AuthAction::Register, response, epoch)
                    .await
            }
            Err(error) => self.fail_action(AuthAction::Register, &error),
        }
    }

    /// Signs out. Local state is always cleared; the server is told on a best-effort basis.
    pub async fn logout(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_refresh().await;

        let tokens = self.inner.state.borrow().tokens().cloned();

        self.clear_persisted().await;
        self.inner.state.send_replace(SessionState::signed_out());

        if let Some(tokens) = tokens
            && let Err(error) = self.inner.api.logout(&tokens).await
        {
            warn!(error = %error, "server logout failed; local session already cleared");
        }

        info!("signed out");
    }

    /// Ends the session after the API rejected the current credentials.
    pub async fn handle_unauthorized(&self) {
        let epoch = self.current_epoch();
        self.force_logout_if_current(epoch, SESSION_EXPIRED_MESSAGE)
            .await;
    }

    /// Requests a password reset email.
    pub async fn forgot_password(&self, email: &str) -> AuthActionOutcome {
        let email = match EmailAddress::new(email) {
            Ok(email) => email,
            Err(error) => {
                let mut field_errors = FieldErrors::new();
                field_errors.insert("email".to_owned(), vec![validation_text(&error)]);
                return self.reject_invalid(field_errors);
            }
        };

        self.inner.state.send_modify(SessionState::begin_loading);
        match self.inner.api.forgot_password(email.as_str()).await {
            Ok(()) => {
                self.inner.state.send_modify(SessionState::finish_loading);
                AuthActionOutcome::succeeded()
            }
            Err(error) => self.fail_action(AuthAction::ForgotPassword, &error),
        }
    }

    /// Sets a new password using a reset token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthActionOutcome {
        let mut field_errors = FieldErrors::new();
        if token.trim().is_empty() {
            field_errors.insert("token".to_owned(), vec!["reset token is required".to_owned()]);
        }
        let issues = password_issues(new_password);
        if !issues.is_empty() {
            field_errors.insert("password".to_owned(), issues);
        }
        if !field_errors.is_empty() {
            return self.reject_invalid(field_errors);
        }

        self.inner.state.send_modify(SessionState::begin_loading);
        match self.inner.api.reset_password(token, new_password).await {
            Ok(()) => {
                self.inner.state.send_modify(SessionState::finish_loading);
                AuthActionOutcome::succeeded()
            }
            Err(error) => self.fail_action(AuthAction::ResetPassword, &error),
        }
    }

    fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    async fn complete_sign_in(
        &self,
        action: AuthAction,
        response: AuthResponse,
        epoch: u64,
    ) -> AuthActionOutcome {
        let user_id = response.user.id.clone();
        let identity = SessionIdentity {
            user: response.user,
            tokens: response.tokens,
        };

        match self.establish(identity, epoch, None).await {
            Ok(true) => {
                info!(action = action.as_str(), user_id = %user_id, "signed in");
                AuthActionOutcome::succeeded()
            }
            Ok(false) => {
                info!(
                    action = action.as_str(),
                    "sign-in result discarded after concurrent logout"
                );
                AuthActionOutcome::failed("Sign-in was cancelled")
            }
            Err(error) => self.fail_action(action, &error),
        }
    }

    fn reject_invalid(&self, field_errors: FieldErrors) -> AuthActionOutcome {
        let outcome = AuthActionOutcome::invalid(field_errors);
        let message = outcome.error.clone().unwrap_or_default();
        self.inner.state.send_modify(|state| state.fail(message));
        outcome
    }

    fn fail_action(&self, action: AuthAction, error: &AppError) -> AuthActionOutcome {
        let message = action.user_message(error);
        warn!(action = action.as_str(), error = %error, "auth action failed");
        self.inner
            .state
            .send_modify(|state| state.fail(message.clone()));
        AuthActionOutcome::failed(message)
    }
}

fn validation_text(error: &AppError) -> String {
    match error {
        AppError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}
