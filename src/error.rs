//! Auth error taxonomy.
//!
//! DESIGN
//! ======
//! Backend errors arrive in loosely shaped payloads (GoTrue `error_code`,
//! `error_description`, `msg`, PostgREST `code`/`message`). `classify` is the
//! single place that pattern-matches on those strings; everything above it
//! works with the closed `AuthErrorKind` enum.

use serde::Serialize;

use crate::backend::BackendError;
use crate::notify::Notification;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured errors.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// AUTH ERROR KIND
// =============================================================================

/// Closed set of auth failure categories surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    InvalidEmail,
    InvalidCredentials,
    EmailInUse,
    SessionExpired,
    NetworkError,
    RateLimited,
    UnknownError,
}

impl AuthErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEmail => "invalid_email",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailInUse => "email_in_use",
            Self::SessionExpired => "session_expired",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Notification title shown for this kind.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email",
            Self::InvalidCredentials => "Sign in failed",
            Self::EmailInUse => "Email already registered",
            Self::SessionExpired => "Session expired",
            Self::NetworkError => "Connection problem",
            Self::RateLimited => "Too many attempts",
            Self::UnknownError => "Something went wrong",
        }
    }

    /// Notification description shown for this kind.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::InvalidCredentials => "The email or password you entered is incorrect.",
            Self::EmailInUse => "An account with this email already exists. Try signing in instead.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::NetworkError => "We couldn't reach the server. Check your connection and try again.",
            Self::RateLimited => "Please wait a moment before trying again.",
            Self::UnknownError => "An unexpected error occurred. Please try again.",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translate a backend error into the closed auth taxonomy.
#[must_use]
pub fn classify(err: &BackendError) -> AuthErrorKind {
    match err {
        BackendError::Network(_) => AuthErrorKind::NetworkError,
        BackendError::NoSession => AuthErrorKind::SessionExpired,
        BackendError::Decode(_) | BackendError::Storage(_) => AuthErrorKind::UnknownError,
        BackendError::Api { status, code, message } => {
            let code = code.as_deref().unwrap_or_default().to_ascii_lowercase();
            let message = message.to_ascii_lowercase();
            let mentions = |needles: &[&str]| needles.iter().any(|n| code.contains(n) || message.contains(n));

            if *status == 429 || mentions(&["rate limit", "too many", "over_request_rate_limit", "over_email_send_rate_limit"]) {
                AuthErrorKind::RateLimited
            } else if mentions(&["invalid login credentials", "invalid_credentials", "invalid_grant"]) {
                AuthErrorKind::InvalidCredentials
            } else if mentions(&["already registered", "already exists", "user_already_exists", "email_exists"]) {
                AuthErrorKind::EmailInUse
            } else if mentions(&["invalid email", "email_address_invalid", "unable to validate email"]) {
                AuthErrorKind::InvalidEmail
            } else if mentions(&["jwt expired", "session_expired", "session_not_found", "refresh_token_not_found", "invalid refresh token"]) {
                AuthErrorKind::SessionExpired
            } else if *status >= 500 {
                AuthErrorKind::NetworkError
            } else {
                AuthErrorKind::UnknownError
            }
        }
    }
}

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Classified auth failure re-raised to the caller after notification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    #[must_use]
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Destructive notification describing this failure.
    #[must_use]
    pub fn notification(&self) -> Notification {
        Notification::destructive(self.kind.title(), self.kind.description())
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        Self { kind: classify(&err), message: err.to_string() }
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        self.kind.as_str()
    }

    fn retryable(&self) -> bool {
        matches!(self.kind, AuthErrorKind::NetworkError | AuthErrorKind::RateLimited)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
