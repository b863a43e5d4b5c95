//! Recovery controller: detects and repairs a broken authenticated connection.
//!
//! ARCHITECTURE
//! ============
//! Three triggers converge on `recover_connection`:
//! - the periodic health check (`spawn_health_check`), while a session exists
//! - `guard_fetch`, when a data call comes back permission-denied
//! - a manual "refresh authentication" action from the facade
//!
//! A separate timer (`spawn_token_refresh`) refreshes the token on a fixed
//! period regardless of health-check outcomes.
//!
//! INVARIANTS
//! ==========
//! - Two recovery attempts never run within `recovery_debounce` of each
//!   other; the later one returns `{ success: false, recovered: false }`.
//! - Recovery failures are logged and surfaced as warnings; they never
//!   propagate as errors into the calling auth flow.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::types::{now_ms, now_secs};
use crate::backend::{AuthBackend, BackendError, Session};
use crate::config::Timings;
use crate::guard::{self, Navigator};
use crate::notify::{Notification, Notifier};
use crate::services::session::SessionStore;

/// Floor applied to a zero timer period.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_secs(1);

// =============================================================================
// TYPES
// =============================================================================

/// Outcome of a connection probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// The current token is accepted.
    Ok,
    /// The token has expired but a refresh may still succeed.
    Expired,
    /// The token was rejected.
    Invalid,
    /// There is no session to probe with.
    Missing,
    /// The probe itself failed (network, unexpected response).
    Error,
}

/// Result of one `recover_connection` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// The connection is usable after the attempt.
    pub success: bool,
    /// A repair (token refresh) actually ran and succeeded.
    pub recovered: bool,
    /// Session in effect after the attempt, if any.
    pub session: Option<Session>,
}

impl RecoveryOutcome {
    fn failed() -> Self {
        Self { success: false, recovered: false, session: None }
    }
}

/// Map a failed probe to a connection status.
#[must_use]
pub fn classify_probe(err: &BackendError) -> ConnectionStatus {
    match err {
        BackendError::NoSession => ConnectionStatus::Missing,
        BackendError::Api { message, .. } if message.to_ascii_lowercase().contains("expired") => {
            ConnectionStatus::Expired
        }
        e if e.is_permission_denied() => ConnectionStatus::Invalid,
        _ => ConnectionStatus::Error,
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct RecoveryController {
    backend: Arc<dyn AuthBackend>,
    store: Arc<SessionStore>,
    notifier: Notifier,
    navigator: Arc<dyn Navigator>,
    timings: Timings,
    last_attempt: Mutex<Option<Instant>>,
}

impl RecoveryController {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<SessionStore>,
        notifier: Notifier,
        navigator: Arc<dyn Navigator>,
        timings: Timings,
    ) -> Self {
        Self { backend, store, notifier, navigator, timings, last_attempt: Mutex::new(None) }
    }

    /// Probe the backend with the current token.
    pub async fn diagnose(&self) -> ConnectionStatus {
        let session = match self.backend.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return ConnectionStatus::Missing,
            Err(BackendError::Network(e)) => {
                debug!(error = %e, "connection probe could not reach backend");
                return ConnectionStatus::Error;
            }
            // The adapter drops its session when a transparent refresh is rejected.
            Err(e) => {
                debug!(error = %e, "session lookup failed during probe");
                return ConnectionStatus::Missing;
            }
        };

        if session.is_expired_at(now_secs()) {
            return ConnectionStatus::Expired;
        }

        match self.backend.get_user(&session.access_token).await {
            Ok(_) => ConnectionStatus::Ok,
            Err(e) => {
                debug!(error = %e, "connection probe rejected");
                classify_probe(&e)
            }
        }
    }

    /// Verify the connection and repair it if possible.
    ///
    /// `last_refresh` is the caller's last observed token refresh (ms since
    /// epoch), recorded for diagnostics.
    pub async fn recover_connection(&self, last_refresh: Option<i64>) -> RecoveryOutcome {
        self.recover_connection_at(last_refresh, Instant::now()).await
    }

    pub(crate) async fn recover_connection_at(&self, last_refresh: Option<i64>, now: Instant) -> RecoveryOutcome {
        if !self.begin_attempt(now) {
            debug!("recovery attempt debounced");
            return RecoveryOutcome::failed();
        }

        let status = self.diagnose().await;
        info!(?status, last_refresh_ms = ?last_refresh, "connection diagnosed");

        match status {
            ConnectionStatus::Ok => RecoveryOutcome { success: true, recovered: false, session: self.store.snapshot().session },
            ConnectionStatus::Expired | ConnectionStatus::Invalid => self.try_refresh().await,
            ConnectionStatus::Missing => {
                self.require_reauthentication();
                RecoveryOutcome::failed()
            }
            ConnectionStatus::Error => {
                self.notifier.notify(Notification::warning(
                    "Connection problem",
                    "We couldn't verify your session. We'll keep trying.",
                ));
                RecoveryOutcome::failed()
            }
        }
    }

    fn last_attempt(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_attempt
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn within_debounce(&self, last: Option<Instant>, now: Instant) -> bool {
        last.is_some_and(|prev| now.saturating_duration_since(prev) < self.timings.recovery_debounce)
    }

    /// True when an attempt made now would be debounced.
    #[must_use]
    pub fn is_debounced(&self) -> bool {
        let last = *self.last_attempt();
        self.within_debounce(last, Instant::now())
    }

    /// Claim the attempt slot unless the previous attempt is too recent.
    fn begin_attempt(&self, now: Instant) -> bool {
        let mut last = self.last_attempt();
        if self.within_debounce(*last, now) {
            return false;
        }
        *last = Some(now);
        true
    }

    async fn try_refresh(&self) -> RecoveryOutcome {
        match self.refresh_token().await {
            Ok(session) => {
                info!(user_id = %session.user.id, "connection recovered by token refresh");
                self.notifier
                    .notify(Notification::success("Connection restored", "Your session has been refreshed."));
                RecoveryOutcome { success: true, recovered: true, session: Some(session) }
            }
            Err(e) => {
                warn!(error = %e, "token refresh during recovery failed");
                self.notifier.notify(Notification::warning(
                    "Session refresh failed",
                    "Please sign in again if the problem persists.",
                ));
                RecoveryOutcome::failed()
            }
        }
    }

    fn require_reauthentication(&self) {
        warn!("no session available; re-authentication required");
        self.store.clear();
        self.notifier.notify(Notification::destructive(
            "Authentication required",
            "Your session has ended. Please sign in again.",
        ));
        guard::enforce(&self.store.snapshot(), self.navigator.as_ref());
    }

    /// Refresh the token unconditionally and mirror the new session.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the refresh is rejected or unreachable.
    pub async fn refresh_token(&self) -> Result<Session, BackendError> {
        let session = self.backend.refresh_session().await?;
        self.store.set_user_and_session(Some(session.clone()));
        self.store.set_token_refresh(now_ms());
        Ok(session)
    }

    /// Run a data fetch; on a permission-denied error, attempt recovery and
    /// retry once if the connection was repaired.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when recovery does not repair the connection.
    pub async fn guard_fetch<T, F, Fut>(&self, fetch: F) -> Result<T, BackendError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        match fetch().await {
            Err(e) if e.is_permission_denied() => {
                warn!(error = %e, "data fetch denied; attempting recovery");
                let outcome = self
                    .recover_connection(self.store.snapshot().last_token_refresh)
                    .await;
                if outcome.recovered { fetch().await } else { Err(e) }
            }
            other => other,
        }
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Interval whose first tick is already consumed. A zero period is
    /// raised to `MIN_TIMER_PERIOD`; `tokio::time::interval` rejects zero.
    async fn ticker(name: &'static str, period: Duration) -> Interval {
        let period = if period.is_zero() {
            warn!(timer = name, fallback_ms = MIN_TIMER_PERIOD.as_millis(), "zero timer period; using minimum");
            MIN_TIMER_PERIOD
        } else {
            period
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        ticker
    }

    /// Periodic health check. Ticks without a session are skipped.
    pub fn spawn_health_check(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = Self::ticker("health_check", this.timings.health_check_interval).await;
            loop {
                ticker.tick().await;
                let state = this.store.snapshot();
                if state.session.is_none() {
                    continue;
                }
                let outcome = this.recover_connection(state.last_token_refresh).await;
                debug!(success = outcome.success, recovered = outcome.recovered, "health check complete");
            }
        })
    }

    /// Unconditional token refresh. Ticks without a session are skipped.
    pub fn spawn_token_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = Self::ticker("token_refresh", this.timings.token_refresh_interval).await;
            loop {
                ticker.tick().await;
                if this.store.snapshot().session.is_none() {
                    continue;
                }
                match this.refresh_token().await {
                    Ok(_) => debug!("scheduled token refresh complete"),
                    Err(e) => warn!(error = %e, "scheduled token refresh failed"),
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "recovery_test.rs"]
mod tests;
