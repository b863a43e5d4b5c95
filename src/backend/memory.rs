//! In-process auth backend.
//!
//! Mirrors the hosted backend's observable behavior (error codes, events,
//! sign-out semantics) without a network. Knobs such as `set_offline` and
//! `expire_session` let callers drive the failure paths.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::{AuthChangeEvent, AuthEvent, BackendError, Session, SignUpResponse, User, now_secs};
use super::{AuthBackend, AuthEvents};

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const MIN_PASSWORD_LEN: usize = 6;
const STORAGE_KEY: &str = "sb-memory-auth-token";
const TOKEN_BYTES: usize = 32;

/// Opaque token: `<kind>_` followed by random hex.
fn mint_token(kind: &str) -> String {
    let entropy: [u8; TOKEN_BYTES] = rand::rng().random();
    let mut token = format!("{kind}_");
    for byte in entropy {
        let _ = write!(token, "{byte:02x}");
    }
    token
}

fn api_error(status: u16, code: &str, message: &str) -> BackendError {
    BackendError::Api { status, code: Some(code.to_owned()), message: message.to_owned() }
}

struct Account {
    user: User,
    password: String,
}

/// Issued access token and the moment it stops being accepted.
struct IssuedToken {
    user_id: Uuid,
    expires_at: i64,
}

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    access_tokens: HashMap<String, IssuedToken>,
    refresh_tokens: HashMap<String, Uuid>,
    require_confirmation: bool,
    offline: bool,
    fail_next_sign_out: bool,
    fail_get_session: bool,
    latency: Duration,
    reset_requests: Vec<String>,
}

pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    events: AuthEvents,
    token_ttl_secs: i64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(MemoryInner::default()), events: AuthEvents::new(), token_ttl_secs: DEFAULT_TOKEN_TTL_SECS }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_online(inner: &MemoryInner) -> Result<(), BackendError> {
        if inner.offline {
            return Err(BackendError::Network("backend unreachable".to_owned()));
        }
        Ok(())
    }

    fn issue_session(&self, inner: &mut MemoryInner, user: &User) -> Session {
        let access_token = mint_token("at");
        let refresh_token = mint_token("rt");
        let expires_at = now_secs() + self.token_ttl_secs;
        inner
            .access_tokens
            .insert(access_token.clone(), IssuedToken { user_id: user.id, expires_at });
        inner.refresh_tokens.insert(refresh_token.clone(), user.id);
        let session = Session {
            access_token,
            refresh_token,
            expires_at,
            token_type: "bearer".to_owned(),
            user: user.clone(),
        };
        inner.session = Some(session.clone());
        session
    }

    // -------------------------------------------------------------------------
    // knobs
    // -------------------------------------------------------------------------

    /// Register a confirmed account directly.
    pub fn seed_account(&self, email: &str, password: &str) -> User {
        let user = User { id: Uuid::new_v4(), email: email.to_owned() };
        self.lock()
            .accounts
            .insert(email.to_owned(), Account { user: user.clone(), password: password.to_owned() });
        user
    }

    /// When set, sign-up returns no session (email confirmation pending).
    pub fn set_require_confirmation(&self, require: bool) {
        self.lock().require_confirmation = require;
    }

    /// When set, every remote call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay every remote call by `latency` before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    async fn round_trip(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Make the next sign-out's remote call fail with a network error.
    pub fn fail_next_sign_out(&self) {
        self.lock().fail_next_sign_out = true;
    }

    /// Make `get_session` fail with an API error.
    pub fn set_fail_get_session(&self, fail: bool) {
        self.lock().fail_get_session = fail;
    }

    /// Expire the current access token while keeping its refresh token valid.
    pub fn expire_session(&self) {
        let mut inner = self.lock();
        let past = now_secs() - 1;
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        session.expires_at = past;
        let token = session.access_token.clone();
        if let Some(issued) = inner.access_tokens.get_mut(&token) {
            issued.expires_at = past;
        }
    }

    /// Revoke every token server-side; the local session is left in place.
    pub fn revoke_tokens(&self) {
        let mut inner = self.lock();
        inner.access_tokens.clear();
        inner.refresh_tokens.clear();
    }

    /// Drop the local session without emitting an event.
    pub fn forget_session(&self) {
        self.lock().session = None;
    }

    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.lock().accounts.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let inner = self.lock();
        if inner.fail_get_session {
            return Err(api_error(500, "unexpected_failure", "session lookup failed"));
        }
        Ok(inner.session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: serde_json::Value,
    ) -> Result<SignUpResponse, BackendError> {
        self.round_trip().await;
        let (user, session) = {
            let mut inner = self.lock();
            Self::check_online(&inner)?;
            if !email.contains('@') {
                return Err(api_error(
                    400,
                    "email_address_invalid",
                    "Unable to validate email address: invalid format",
                ));
            }
            if password.len() < MIN_PASSWORD_LEN {
                return Err(api_error(422, "weak_password", "Password should be at least 6 characters"));
            }
            if inner.accounts.contains_key(email) {
                return Err(api_error(422, "user_already_exists", "User already registered"));
            }
            let user = User { id: Uuid::new_v4(), email: email.to_owned() };
            inner
                .accounts
                .insert(email.to_owned(), Account { user: user.clone(), password: password.to_owned() });
            let session = if inner.require_confirmation { None } else { Some(self.issue_session(&mut inner, &user)) };
            (user, session)
        };

        if let Some(session) = &session {
            self.events
                .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        }
        Ok(SignUpResponse { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.round_trip().await;
        let session = {
            let mut inner = self.lock();
            Self::check_online(&inner)?;
            let user = match inner.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(api_error(400, "invalid_credentials", "Invalid login credentials")),
            };
            self.issue_session(&mut inner, &user)
        };
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.round_trip().await;
        let result = {
            let mut inner = self.lock();
            let session = inner.session.take();
            if inner.offline || std::mem::take(&mut inner.fail_next_sign_out) {
                Err(BackendError::Network("sign-out request failed".to_owned()))
            } else {
                if let Some(session) = session {
                    inner.access_tokens.remove(&session.access_token);
                    inner.refresh_tokens.remove(&session.refresh_token);
                }
                Ok(())
            }
        };
        self.events.emit(AuthChangeEvent::SignedOut, None);
        result
    }

    async fn reset_password_for_email(&self, email: &str, _redirect_to: Option<&str>) -> Result<(), BackendError> {
        self.round_trip().await;
        let mut inner = self.lock();
        Self::check_online(&inner)?;
        inner.reset_requests.push(email.to_owned());
        Ok(())
    }

    async fn update_user(&self, password: &str) -> Result<User, BackendError> {
        self.round_trip().await;
        let session = {
            let mut inner = self.lock();
            Self::check_online(&inner)?;
            let session = inner.session.clone().ok_or(BackendError::NoSession)?;
            if password.len() < MIN_PASSWORD_LEN {
                return Err(api_error(422, "weak_password", "Password should be at least 6 characters"));
            }
            if let Some(account) = inner.accounts.get_mut(&session.user.email) {
                account.password = password.to_owned();
            }
            session
        };
        self.events
            .emit(AuthChangeEvent::UserUpdated, Some(session.clone()));
        Ok(session.user)
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        self.round_trip().await;
        let session = {
            let mut inner = self.lock();
            Self::check_online(&inner)?;
            let current = inner.session.clone().ok_or(BackendError::NoSession)?;
            if inner
                .refresh_tokens
                .remove(&current.refresh_token)
                .is_none()
            {
                return Err(api_error(400, "refresh_token_not_found", "Invalid Refresh Token: Refresh Token Not Found"));
            }
            inner.access_tokens.remove(&current.access_token);
            self.issue_session(&mut inner, &current.user)
        };
        self.events
            .emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    async fn get_user(&self, access_token: &str) -> Result<User, BackendError> {
        self.round_trip().await;
        let inner = self.lock();
        Self::check_online(&inner)?;
        let Some(issued) = inner.access_tokens.get(access_token) else {
            return Err(api_error(403, "bad_jwt", "invalid JWT: unable to parse or verify signature"));
        };
        if issued.expires_at <= now_secs() {
            return Err(api_error(403, "bad_jwt", "invalid JWT: token is expired"));
        }
        inner
            .accounts
            .values()
            .find(|a| a.user.id == issued.user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| api_error(404, "user_not_found", "User not found"))
    }

    fn storage_key(&self) -> String {
        STORAGE_KEY.to_owned()
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
