//! Session state store — the single authoritative mirror of auth state.
//!
//! ARCHITECTURE
//! ============
//! `AuthState` is published through a `tokio::sync::watch` channel so the
//! route guard and the facade can both read the latest value and await
//! changes. Two sources feed it at mount: backend auth-change events and one
//! initial `get_session` fetch. They may race; both write the same
//! backend-authoritative value, so last-write-wins is acceptable.
//!
//! INVARIANTS
//! ==========
//! - `is_initialized` flips to `true` exactly once, from whichever source
//!   completes first, including the failure, panic, and timeout paths.
//! - An initial-fetch failure is recorded in `error` but never blocks
//!   initialization.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::types::now_ms;
use crate::backend::{AuthBackend, AuthChangeEvent, AuthEvent, Session, User};

// =============================================================================
// STATE
// =============================================================================

/// Position in the identity lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    SigningOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorCode {
    /// The backend answered the session fetch with an error.
    SessionError,
    /// The session fetch itself blew up (panicked or timed out).
    AuthException,
}

/// Last failure recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreError {
    /// Which path produced the failure.
    pub code: SessionErrorCode,
    /// Human-readable detail from the backend or the runtime.
    pub message: String,
}

/// Mirrored auth state. The backend adapter owns the real session.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    /// User of the mirrored session.
    pub user: Option<User>,
    /// Mirrored session; `None` when signed out.
    pub session: Option<Session>,
    /// Lifecycle position.
    pub status: AuthStatus,
    /// A session fetch or facade network call is in flight.
    pub is_loading: bool,
    /// The first session fetch or auth event has been applied.
    pub is_initialized: bool,
    /// Last initialization failure; cleared when a session arrives.
    pub error: Option<StoreError>,
    /// Milliseconds since Unix epoch of the last observed token refresh.
    pub last_token_refresh: Option<i64>,
}

impl AuthState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated && self.session.is_some()
    }
}

// =============================================================================
// STORE
// =============================================================================

pub struct SessionStore {
    state: watch::Sender<AuthState>,
    /// Facade operations currently holding a `LoadingGuard`.
    in_flight: AtomicUsize,
}

impl SessionStore {
    /// New store in the loading, uninitialized state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState { is_loading: true, ..AuthState::default() });
        Self { state, in_flight: AtomicUsize::new(0) }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Mirror a session (or its absence). Status follows the session unless a
    /// transition owned by the facade is in progress.
    pub fn set_user_and_session(&self, session: Option<Session>) {
        self.state.send_modify(|state| {
            state.status = match (session.is_some(), state.status) {
                (true, _) => AuthStatus::Authenticated,
                (false, status @ (AuthStatus::Authenticating | AuthStatus::SigningOut)) => status,
                (false, _) => AuthStatus::Anonymous,
            };
            state.user = session.as_ref().map(|s| s.user.clone());
            state.session = session;
            if state.session.is_some() {
                state.error = None;
            }
        });
    }

    /// Drop the mirrored user and session.
    pub fn clear(&self) {
        self.set_user_and_session(None);
    }

    pub fn set_status(&self, status: AuthStatus) {
        self.state.send_modify(|state| state.status = status);
    }

    pub fn set_error(&self, error: Option<StoreError>) {
        self.state.send_modify(|state| state.error = error);
    }

    /// Raise `is_loading` until the returned guard drops. Overlapping guards
    /// keep the flag up until the last one is released.
    #[must_use = "loading is cleared when the guard drops"]
    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|state| !std::mem::replace(&mut state.is_loading, true));
        LoadingGuard { store: self }
    }

    fn end_loading(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        // Before initialization the store still reports loading.
        self.state.send_if_modified(|state| {
            let loading = !state.is_initialized;
            let changed = state.is_loading != loading;
            state.is_loading = loading;
            changed
        });
    }

    pub fn set_token_refresh(&self, at_ms: i64) {
        self.state
            .send_modify(|state| state.last_token_refresh = Some(at_ms));
    }

    /// Mark the store initialized. Returns `true` only on the first call.
    pub fn mark_initialized(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_initialized {
                return false;
            }
            state.is_initialized = true;
            state.is_loading = self.in_flight.load(Ordering::SeqCst) > 0;
            true
        })
    }

    /// Wait until `predicate` holds or `timeout` elapses. Returns whether it held.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(&AuthState) -> bool,
    {
        let mut rx = self.state.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await;
        matches!(result, Ok(Ok(_)))
    }

    pub async fn wait_until_initialized(&self, timeout: Duration) -> bool {
        self.wait_for(|s| s.is_initialized, timeout).await
    }

    fn apply_event(&self, event: &AuthEvent) {
        debug!(kind = ?event.kind, "applying auth event");
        self.set_user_and_session(event.session.clone());
        if event.kind == AuthChangeEvent::TokenRefreshed {
            self.set_token_refresh(now_ms());
        }
        self.mark_initialized();
    }

    /// Subscribe to backend auth events and fetch the current session once.
    ///
    /// Dropping the returned subscription stops the event listener.
    pub fn mount(self: &Arc<Self>, backend: Arc<dyn AuthBackend>, init_timeout: Duration) -> StoreSubscription {
        let mut events = backend.subscribe();
        let store = Arc::clone(self);
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => store.apply_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let store = Arc::clone(self);
        let initial_fetch = tokio::spawn(async move {
            store.load_initial_session(backend, init_timeout).await;
        });

        StoreSubscription { listener, initial_fetch: Some(initial_fetch) }
    }

    async fn load_initial_session(&self, backend: Arc<dyn AuthBackend>, timeout: Duration) {
        // Spawned so a panicking adapter surfaces as a JoinError instead of
        // tearing down this task before initialization.
        let fetch = tokio::spawn(async move { backend.get_session().await });
        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(Ok(session))) => {
                info!(restored = session.is_some(), "initial session loaded");
                self.set_user_and_session(session);
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "initial session fetch failed");
                self.set_error(Some(StoreError { code: SessionErrorCode::SessionError, message: e.to_string() }));
            }
            Ok(Err(join)) => {
                warn!(error = %join, "initial session fetch aborted");
                self.set_error(Some(StoreError { code: SessionErrorCode::AuthException, message: join.to_string() }));
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "initial session fetch timed out");
                self.set_error(Some(StoreError {
                    code: SessionErrorCode::AuthException,
                    message: format!("session fetch timed out after {}ms", timeout.as_millis()),
                }));
            }
        }
        self.mark_initialized();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the store's `is_loading` flag raised while a network call runs.
pub struct LoadingGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.end_loading();
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live backend subscription. Dropping it cancels the event listener; an
/// in-flight initial fetch still resolves.
pub struct StoreSubscription {
    listener: JoinHandle<()>,
    initial_fetch: Option<JoinHandle<()>>,
}

impl StoreSubscription {
    /// Wait for the initial session fetch to settle.
    pub async fn initial_fetch_done(&mut self) {
        if let Some(fetch) = self.initial_fetch.take() {
            let _ = fetch.await;
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
