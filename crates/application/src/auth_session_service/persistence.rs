use tessera_core::{AppError, AppResult};
use tessera_domain::{AuthTokens, AuthUser, SessionIdentity, SessionState};
use tracing::{debug, warn};

use crate::auth_ports::{AUTH_TOKENS_STORAGE_KEY, AUTH_USER_STORAGE_KEY};

use super::*;

impl AuthSessionService {
    /// Reloads a persisted session, refreshing it when the access token has expired.
    ///
    /// Returns whether a session is active afterwards. Partial or unreadable
    /// persisted state is cleared.
    pub async fn restore(&self) -> AppResult<bool> {
        let epoch = self.current_epoch();
        let generation = self.current_generation();
        let Some(identity) = self.load_persisted().await? else {
            return Ok(false);
        };

        if identity.tokens.is_expired_at(self.inner.clock.now()) {
            info!("persisted access token expired; attempting refresh");
            if let Err(error) = self.refresh_identity(identity, epoch, generation).await {
                debug!(error = %error, "persisted session could not be refreshed");
            }
            return Ok(self.is_authenticated());
        }

        let user_id = identity.user.id.clone();
        let restored = self.establish(identity, epoch, None).await?;
        if restored {
            info!(user_id = %user_id, "session restored from storage");
        }

        Ok(restored)
    }

    /// Installs a new identity unless a logout happened since `epoch`.
    ///
    /// With `generation` set, the install is also skipped when another
    /// identity was installed since that generation was read.
    pub(super) async fn establish(
        &self,
        identity: SessionIdentity,
        epoch: u64,
        generation: Option<u64>,
    ) -> AppResult<bool> {
        let _install = self.inner.install.lock().await;
        if self.current_epoch() != epoch {
            return Ok(false);
        }
        if generation.is_some_and(|expected| expected != self.current_generation()) {
            debug!("session replaced while refreshing; discarding refreshed tokens");
            return Ok(false);
        }

        if let Err(error) = self.persist(&identity).await {
            self.clear_persisted().await;
            self.inner.state.send_replace(SessionState::signed_out());
            return Err(error);
        }

        if self.current_epoch() != epoch {
            // A logout ran while the identity was being written.
            self.clear_persisted().await;
            return Ok(false);
        }

        let expires_at = identity.tokens.expires_at;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .state
            .send_replace(SessionState::authenticated(identity));
        self.schedule_refresh(expires_at).await;

        Ok(true)
    }

    /// Clears the session unless a logout already happened since `epoch`.
    pub(super) async fn force_logout_if_current(&self, epoch: u64, message: &str) {
        if self
            .inner
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("session already replaced; skipping forced logout");
            return;
        }

        self.cancel_refresh().await;
        self.clear_persisted().await;

        let mut state = SessionState::signed_out();
        state.fail(message);
        self.inner.state.send_replace(state);

        warn!("session ended by forced logout");
    }

    async fn persist(&self, identity: &SessionIdentity) -> AppResult<()> {
        let user = serde_json::to_string(&identity.user)
            .map_err(|error| AppError::Internal(format!("failed to serialize user: {error}")))?;
        let tokens = serde_json::to_string(&identity.tokens)
            .map_err(|error| AppError::Internal(format!("failed to serialize tokens: {error}")))?;

        self.inner
            .storage
            .write(AUTH_USER_STORAGE_KEY, &user)
            .await?;
        self.inner
            .storage
            .write(AUTH_TOKENS_STORAGE_KEY, &tokens)
            .await
    }

    pub(super) async fn clear_persisted(&self) {
        for key in [AUTH_USER_STORAGE_KEY, AUTH_TOKENS_STORAGE_KEY] {
            if let Err(error) = self.inner.storage.remove(key).await {
                warn!(key, error = %error, "failed to clear persisted session key");
            }
        }
    }

    async fn load_persisted(&self) -> AppResult<Option<SessionIdentity>> {
        let user = self.inner.storage.read(AUTH_USER_STORAGE_KEY).await?;
        let tokens = self.inner.storage.read(AUTH_TOKENS_STORAGE_KEY).await?;

        let (user, tokens) = match (user, tokens) {
            (Some(user), Some(tokens)) => (user, tokens),
            (None, None) => return Ok(None),
            _ => {
                warn!("persisted session is incomplete; clearing it");
                self.clear_persisted().await;
                return Ok(None);
            }
        };

        let parsed = serde_json::from_str::<AuthUser>(&user).and_then(|user| {
            serde_json::from_str::<AuthTokens>(&tokens).map(|tokens| SessionIdentity { user, tokens })
        });

        match parsed {
            Ok(identity) => Ok(Some(identity)),
            Err(error) => {
                warn!(error = %error, "persisted session is unreadable; clearing it");
                self.clear_persisted().await;
                Ok(None)
            }
        }
    }
}
