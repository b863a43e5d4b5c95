//! Backend client adapter — the boundary to the hosted auth and table API.
//!
//! DESIGN
//! ======
//! `AuthBackend` is the seam every other component depends on. The adapter
//! exclusively owns the session: it persists it, refreshes it, and announces
//! every change on a broadcast channel of `AuthEvent`s. Consumers only ever
//! hold mirrored copies.
//!
//! `HostedBackend` speaks the GoTrue HTTP API; `MemoryBackend` is an
//! in-process stand-in with the same event semantics.

pub mod hosted;
pub mod memory;
pub mod rest;
pub mod types;

use tokio::sync::broadcast;

pub use hosted::HostedBackend;
pub use memory::MemoryBackend;
pub use types::{AuthChangeEvent, AuthEvent, BackendError, Session, SignUpResponse, User};

const EVENT_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// AUTH BACKEND TRAIT
// =============================================================================

/// Provider-neutral auth client. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Return the stored session, refreshing it first if it is about to expire.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Subscribe to auth-state changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Create an identity. `metadata` is stored as user metadata.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpResponse, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Sign out. The local session is dropped even when the remote call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError>;

    /// Change the signed-in user's password.
    async fn update_user(&self, password: &str) -> Result<User, BackendError>;

    /// Exchange the stored refresh token for a new session.
    async fn refresh_session(&self) -> Result<Session, BackendError>;

    /// Lightweight authenticated call used to probe whether `access_token`
    /// is still accepted.
    async fn get_user(&self, access_token: &str) -> Result<User, BackendError>;

    /// Local-storage key under which the adapter persists its session.
    fn storage_key(&self) -> String;
}

// =============================================================================
// EVENT FAN-OUT
// =============================================================================

/// Broadcast sender shared by adapter implementations.
#[derive(Clone)]
pub(crate) struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. No receivers is not an error.
    pub(crate) fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        tracing::debug!(?kind, has_session = session.is_some(), "auth state change");
        let _ = self.tx.send(AuthEvent { kind, session });
    }
}
