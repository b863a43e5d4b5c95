//! Auth facade: the operations the UI calls.
//!
//! ARCHITECTURE
//! ============
//! Identity lifecycle as seen by the session store:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated -> SigningOut -> Anonymous
//! ```
//!
//! A failed operation is not a state. The error is classified, shown as a
//! destructive notification, and returned to the caller so forms can render
//! inline messages. The machine falls back to `Anonymous` (failed sign-in or
//! sign-up) or stays `Authenticated` (failed password update).
//!
//! INVARIANTS
//! ==========
//! - Every operation emits a notification on success and on failure.
//! - Sign-in and sign-up clear any existing session before authenticating.
//! - Navigation after authentication waits for the store to reflect the new
//!   session instead of sleeping.
//! - Sign-out clears local state before the network call and always ends on
//!   `/login`, whatever the backend answers.
//! - The store reports `is_loading` while an operation waits on the network,
//!   including its failure paths.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{AuthBackend, Session, User};
use crate::error::{AuthError, AuthErrorKind};
use crate::guard::Route;
use crate::gyms::{Gym, GymOwner, normalize_email};
use crate::notify::Notification;
use crate::services::recovery::RecoveryOutcome;
use crate::services::session::AuthStatus;
use crate::state::AppState;

/// Local syntax check; the backend remains the authority.
#[must_use]
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Result of a successful sign-up.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// Session of the new identity.
    pub session: Session,
    /// `None` when provisioning failed; the user was warned and can retry
    /// from settings.
    pub gym: Option<Gym>,
}

pub struct AuthFacade {
    state: AppState,
}

impl AuthFacade {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn backend(&self) -> &dyn AuthBackend {
        self.state.backend.as_ref()
    }

    /// Notify and hand back a classified failure.
    fn fail(&self, operation: &str, err: AuthError) -> AuthError {
        warn!(operation, kind = %err.kind, error = %err.message, "auth operation failed");
        self.state.notifier.notify(err.notification());
        err
    }

    fn checked_email(&self, operation: &str, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if is_plausible_email(&email) {
            Ok(email)
        } else {
            Err(self.fail(operation, AuthError::new(AuthErrorKind::InvalidEmail, format!("'{email}' is not a valid email"))))
        }
    }

    /// Drop whatever session exists so a new identity starts clean.
    async fn clear_existing_session(&self) {
        let had_session = self.state.store.snapshot().session.is_some()
            || matches!(self.backend().get_session().await, Ok(Some(_)));
        if had_session {
            debug!("clearing previous session before authenticating");
            if let Err(e) = self.backend().sign_out().await {
                debug!(error = %e, "previous session sign-out failed");
            }
        }
        self.state.store.clear();
    }

    /// Mirror `session` and wait until the store reflects it.
    async fn settle_session(&self, session: &Session) {
        self.state
            .store
            .set_user_and_session(Some(session.clone()));
        let user_id = session.user.id;
        let settled = self
            .state
            .store
            .wait_for(
                |s| s.is_authenticated() && s.user.as_ref().is_some_and(|u| u.id == user_id),
                self.state.timings.session_wait_timeout,
            )
            .await;
        if !settled {
            warn!(%user_id, "session store did not settle before navigation");
        }
    }

    fn navigate_after_auth(&self) -> Route {
        let route = self
            .state
            .navigator
            .take_return_to()
            .filter(Route::is_protected)
            .unwrap_or(Route::Dashboard);
        self.state.navigator.navigate(route.clone());
        route
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Create an identity, sign in if the backend did not, and provision the
    /// gym under `gym_name`.
    ///
    /// # Errors
    ///
    /// Returns the classified error when the identity cannot be created or
    /// signed in. Provisioning failures do not fail sign-up.
    pub async fn sign_up(&self, email: &str, password: &str, gym_name: &str) -> Result<SignUpOutcome, AuthError> {
        let email = self.checked_email("sign_up", email)?;
        let loading = self.state.store.begin_loading();
        self.clear_existing_session().await;
        self.state.store.set_status(AuthStatus::Authenticating);

        let metadata = serde_json::json!({ "gym_name": gym_name.trim() });
        let session = match self.backend().sign_up(&email, password, metadata).await {
            Ok(resp) => match resp.session {
                Some(session) => Ok(session),
                None => {
                    info!(%email, "sign-up returned no session; signing in");
                    self.backend()
                        .sign_in_with_password(&email, password)
                        .await
                }
            },
            Err(e) => Err(e),
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                self.state.store.set_status(AuthStatus::Anonymous);
                return Err(self.fail("sign_up", e.into()));
            }
        };

        info!(%email, user_id = %session.user.id, "signed up");
        self.settle_session(&session).await;
        let gym = self
            .state
            .provisioner
            .provision_or_warn(&GymOwner::from_user(&session.user), Some(gym_name))
            .await;
        self.state
            .notifier
            .notify(Notification::success("Account created", "Welcome! Your gym is ready."));
        drop(loading);
        self.navigate_after_auth();
        Ok(SignUpOutcome { session, gym })
    }

    /// Authenticate with email and password.
    ///
    /// On success a connection check and gym provisioning run in the
    /// background, and the user is sent to the remembered route or the
    /// dashboard.
    ///
    /// # Errors
    ///
    /// Returns the classified error; the store is left without a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = self.checked_email("sign_in", email)?;
        let loading = self.state.store.begin_loading();
        self.clear_existing_session().await;
        self.state.store.set_status(AuthStatus::Authenticating);

        let session = match self.backend().sign_in_with_password(&email, password).await {
            Ok(session) => session,
            Err(e) => {
                self.state.store.set_status(AuthStatus::Anonymous);
                return Err(self.fail("sign_in", e.into()));
            }
        };

        info!(%email, user_id = %session.user.id, "signed in");
        self.settle_session(&session).await;
        drop(loading);

        let recovery = Arc::clone(&self.state.recovery);
        tokio::spawn(async move {
            let status = recovery.diagnose().await;
            debug!(?status, "post sign-in connection check");
        });
        self.state
            .provisioner
            .provision_in_background(GymOwner::from_user(&session.user), None);

        self.state
            .notifier
            .notify(Notification::success("Welcome back", format!("Signed in as {email}.")));
        self.navigate_after_auth();
        Ok(session)
    }

    /// Sign out. Local state is cleared first; a failed backend call only
    /// downgrades the notification to a warning.
    pub async fn sign_out(&self) {
        let store = &self.state.store;
        store.set_status(AuthStatus::SigningOut);
        store.clear();

        let result = {
            let _loading = store.begin_loading();
            self.backend().sign_out().await
        };
        if let Err(e) = self.state.storage.remove(&self.backend().storage_key()) {
            warn!(error = %e, "failed to clear persisted session");
        }
        store.set_status(AuthStatus::Anonymous);

        match result {
            Ok(()) => {
                info!("signed out");
                self.state
                    .notifier
                    .notify(Notification::success("Signed out", "You have been signed out."));
            }
            Err(e) => {
                warn!(error = %e, "backend sign-out failed; signed out locally");
                self.state.notifier.notify(Notification::warning(
                    "Signed out locally",
                    "We couldn't reach the server, but you've been signed out on this device.",
                ));
            }
        }
        self.state.navigator.navigate(Route::Login);
    }

    /// Send a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns the classified error when the request is rejected.
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = self.checked_email("reset_password", email)?;
        let redirect_to = format!("{}{}", self.state.site_url, Route::Account.path());
        let _loading = self.state.store.begin_loading();
        match self
            .backend()
            .reset_password_for_email(&email, Some(&redirect_to))
            .await
        {
            Ok(()) => {
                info!(%email, "password reset requested");
                self.state.notifier.notify(Notification::success(
                    "Check your email",
                    format!("We sent a password reset link to {email}."),
                ));
                Ok(())
            }
            Err(e) => Err(self.fail("reset_password", e.into())),
        }
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns the classified error; the session is kept.
    pub async fn update_password(&self, password: &str) -> Result<User, AuthError> {
        let _loading = self.state.store.begin_loading();
        match self.backend().update_user(password).await {
            Ok(user) => {
                info!(user_id = %user.id, "password updated");
                self.state
                    .notifier
                    .notify(Notification::success("Password updated", "Your new password is active."));
                Ok(user)
            }
            Err(e) => Err(self.fail("update_password", e.into())),
        }
    }

    /// Manual "refresh authentication" action.
    pub async fn refresh_authentication(&self) -> RecoveryOutcome {
        if self.state.recovery.is_debounced() {
            self.state.notifier.notify(Notification::info(
                "Already checking",
                "Your connection was checked moments ago. Try again shortly.",
            ));
            return RecoveryOutcome { success: false, recovered: false, session: None };
        }
        let outcome = self
            .state
            .recovery
            .recover_connection(self.state.store.snapshot().last_token_refresh)
            .await;
        if outcome.success && !outcome.recovered {
            self.state
                .notifier
                .notify(Notification::info("Connection OK", "Your session is active."));
        }
        outcome
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
