//! Backend types: identities, sessions, auth-change events, and errors.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend adapter calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (DNS, refused, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend error {status}: {message}")]
    Api { status: u16, code: Option<String>, message: String },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The call requires a session and none is stored.
    #[error("no active session")]
    NoSession,

    /// The persisted session could not be read or written.
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl BackendError {
    /// HTTP status for API errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when a data call was rejected for lack of a valid token or by
    /// row-level security.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::NoSession => true,
            Self::Api { status, code, message } => {
                let message = message.to_ascii_lowercase();
                matches!(status, 401 | 403)
                    || code.as_deref().is_some_and(|c| c == "42501" || c.starts_with("PGRST3"))
                    || message.contains("permission denied")
                    || message.contains("jwt")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Api { .. } => "E_API_RESPONSE",
            Self::Decode(_) => "E_API_PARSE",
            Self::NoSession => "E_NO_SESSION",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// IDENTITY & SESSION
// =============================================================================

/// Backend-issued identity. Immutable from the application's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend-assigned identity id.
    pub id: Uuid,
    /// Email the identity signed up with.
    #[serde(default)]
    pub email: String,
}

/// Backend-issued credential bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token sent with every authenticated request.
    pub access_token: String,
    /// Single-use token exchanged for a new session.
    pub refresh_token: String,
    /// Expiry as seconds since Unix epoch.
    pub expires_at: i64,
    /// Always `bearer` for the hosted backend.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Identity the tokens were issued to.
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at <= now_secs
    }

    /// True when the session expires within `margin_secs` of `now_secs`.
    #[must_use]
    pub fn expires_within(&self, now_secs: i64, margin_secs: i64) -> bool {
        self.expires_at - now_secs <= margin_secs
    }
}

/// Result of a sign-up call. `session` is absent when the backend requires
/// email confirmation before issuing tokens.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: User,
    pub session: Option<Session>,
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

/// Kind of auth-state change emitted by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// Auth-state change notification carrying the session after the change.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<Session>,
}

// =============================================================================
// CLOCK
// =============================================================================

/// Current time as seconds since Unix epoch.
#[must_use]
pub fn now_secs() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_secs()).unwrap_or(0)
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
