use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tessera_core::{AppError, AppResult};
use tessera_domain::SessionIdentity;
use tokio::task::JoinHandle;
use tracing::debug;

use super::*;

/// When to refresh an access token ahead of its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// How long before expiry the refresh fires.
    pub lead_time: Duration,
    /// Lower bound on the scheduled delay.
    pub min_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            lead_time: Duration::minutes(5),
            min_delay: Duration::minutes(1),
        }
    }
}

impl RefreshPolicy {
    /// Returns how long to wait before refreshing a token expiring at `expires_at`.
    ///
    /// An expiry too close to the representable range to subtract the lead
    /// time from falls back to the minimum delay.
    #[must_use]
    pub fn delay_until_refresh(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> StdDuration {
        let delay = expires_at
            .checked_sub_signed(self.lead_time)
            .map_or(self.min_delay, |refresh_at| {
                refresh_at.signed_duration_since(now).max(self.min_delay)
            });
        delay.to_std().unwrap_or(StdDuration::ZERO)
    }
}

pub(super) struct ScheduledRefresh {
    id: u64,
    handle: JoinHandle<()>,
}

impl AuthSessionService {
    /// Exchanges the refresh token for new tokens.
    ///
    /// A rejected refresh signs the user out.
    pub async fn refresh_session(&self) -> AppResult<()> {
        let epoch = self.current_epoch();
        // Read before the identity, so a racing sign-in can only make the
        // generation look newer than the identity, never older.
        let generation = self.current_generation();
        let identity = self.inner.state.borrow().identity().cloned();
        let Some(identity) = identity else {
            return Err(AppError::Unauthorized("no active session".to_owned()));
        };

        self.refresh_identity(identity, epoch, generation).await
    }

    pub(super) async fn refresh_identity(
        &self,
        identity: SessionIdentity,
        epoch: u64,
        generation: u64,
    ) -> AppResult<()> {
        match self.inner.api.refresh(&identity.tokens.refresh_token).await {
            Ok(response) => {
                let refreshed = SessionIdentity {
                    user: response.user.unwrap_or(identity.user),
                    tokens: response.tokens,
                };

                if self.establish(refreshed, epoch, Some(generation)).await? {
                    info!("access token refreshed");
                }
                Ok(())
            }
            Err(error) => {
                let _install = self.inner.install.lock().await;
                if self.current_generation() == generation {
                    warn!(error = %error, "token refresh failed; signing out");
                    self.force_logout_if_current(epoch, SESSION_EXPIRED_MESSAGE)
                        .await;
                } else {
                    debug!(error = %error, "stale token refresh failed; keeping the newer session");
                }
                Err(AppError::Unauthorized(format!("token refresh failed: {error}")))
            }
        }
    }

    /// Arms the refresh timer, replacing any pending one.
    pub(super) async fn schedule_refresh(&self, expires_at: DateTime<Utc>) {
        let delay = self
            .inner
            .policy
            .delay_until_refresh(expires_at, self.inner.clock.now());
        let timer_id = self.inner.timer_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);

        // The slot stays locked until the new timer is stored, so the task
        // cannot observe the slot before its own entry is in place.
        let mut slot = self.inner.refresh_timer.lock().await;
        if let Some(previous) = slot.take() {
            previous.handle.abort();
        }

        let handle = tokio::spawn(run_scheduled_refresh(weak, delay, timer_id));

        *slot = Some(ScheduledRefresh {
            id: timer_id,
            handle,
        });

        debug!(delay_seconds = delay.as_secs(), "token refresh scheduled");
    }

    /// Cancels the pending refresh timer, if any.
    pub(super) async fn cancel_refresh(&self) {
        if let Some(previous) = self.inner.refresh_timer.lock().await.take() {
            previous.handle.abort();
            debug!("token refresh cancelled");
        }
    }

    /// Detaches a fired timer from the slot; false when it was superseded.
    async fn release_timer(&self, timer_id: u64) -> bool {
        let mut slot = self.inner.refresh_timer.lock().await;
        match slot.as_ref() {
            Some(scheduled) if scheduled.id == timer_id => {
                slot.take();
                true
            }
            _ => false,
        }
    }
}

// Boxed so the timer future does not recursively contain its own type.
fn run_scheduled_refresh(
    weak: Weak<SessionInner>,
    delay: StdDuration,
    timer_id: u64,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let service = AuthSessionService { inner };
        if !service.release_timer(timer_id).await {
            return;
        }

        if let Err(error) = service.refresh_session().await {
            debug!(error = %error, "scheduled refresh did not complete");
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use tessera_domain::AuthTokens;

    use super::RefreshPolicy;

    #[test]
    fn refresh_fires_five_minutes_before_expiry() {
        let now = Utc::now();
        let delay = RefreshPolicy::default().delay_until_refresh(now + Duration::hours(1), now);
        assert_eq!(delay, StdDuration::from_secs(55 * 60));
    }

    #[test]
    fn refresh_delay_never_drops_below_one_minute() {
        let now = Utc::now();
        let policy = RefreshPolicy::default();

        assert_eq!(
            policy.delay_until_refresh(now + Duration::minutes(3), now),
            StdDuration::from_secs(60)
        );
        assert_eq!(
            policy.delay_until_refresh(now - Duration::minutes(3), now),
            StdDuration::from_secs(60)
        );
    }

    #[test]
    fn oversized_lead_time_falls_back_to_minimum_delay() {
        let now = Utc::now();
        let policy = RefreshPolicy {
            lead_time: Duration::seconds(9_000_000_000_000),
            ..RefreshPolicy::default()
        };

        assert_eq!(
            policy.delay_until_refresh(now + Duration::hours(1), now),
            StdDuration::from_secs(60)
        );
    }

    #[test]
    fn expiry_at_the_start_of_time_falls_back_to_minimum_delay() {
        let tokens: AuthTokens = serde_json::from_value(serde_json::json!({
            "accessToken": "access",
            "refreshToken": "refresh",
            "expiresAt": "-262143-01-01T00:00:00Z",
            "tokenType": "Bearer",
        }))
        .unwrap_or_else(|_| unreachable!());

        let delay = RefreshPolicy::default().delay_until_refresh(tokens.expires_at, Utc::now());
        assert_eq!(delay, StdDuration::from_secs(60));
    }
}
