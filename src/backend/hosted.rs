//! GoTrue-compatible hosted auth client.
//!
//! Thin HTTP wrapper over `/auth/v1/*`. The session lives in memory and is
//! mirrored to local storage under `sb-<project-ref>-auth-token` so it
//! survives restarts. Response parsing is pure (`parse_*`) for testability.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::types::{AuthChangeEvent, AuthEvent, BackendError, Session, SignUpResponse, User, now_secs};
use super::{AuthBackend, AuthEvents};
use crate::config::BackendConfig;
use crate::storage::{self, LocalStore};

/// Refresh proactively when the session expires within this many seconds.
const EXPIRY_MARGIN_SECS: i64 = 60;
/// Lifetime assumed when a token response carries neither `expires_at` nor `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HostedBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    storage: Arc<dyn LocalStore>,
    storage_key: String,
    session: Mutex<Option<Session>>,
    events: AuthEvents,
}

impl HostedBackend {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, storage: Arc<dyn LocalStore>) -> Result<Self, BackendError> {
        let http = build_http_client(config)?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            storage,
            storage_key: format!("sb-{}-auth-token", config.project_ref()),
            session: Mutex::new(None),
            events: AuthEvents::new(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let resp = req.header("apikey", &self.anon_key).send().await?;
        read_body(resp).await
    }

    fn cached(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// In-memory session, falling back to the persisted copy.
    fn load_session(&self) -> Option<Session> {
        if let Some(session) = self.cached().clone() {
            return Some(session);
        }
        match storage::get_json::<Session>(self.storage.as_ref(), &self.storage_key) {
            Ok(Some(session)) => {
                *self.cached() = Some(session.clone());
                Some(session)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, key = %self.storage_key, "discarding unreadable persisted session");
                let _ = self.storage.remove(&self.storage_key);
                None
            }
        }
    }

    fn persist(&self, session: Option<&Session>) {
        *self.cached() = session.cloned();
        let result = match session {
            Some(s) => storage::set_json(self.storage.as_ref(), &self.storage_key, s),
            None => self.storage.remove(&self.storage_key),
        };
        if let Err(e) = result {
            warn!(error = %e, key = %self.storage_key, "session persistence failed");
        }
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, BackendError> {
        let req = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .bearer_auth(&self.anon_key)
            .json(&body);
        let text = self.send(req).await?;
        parse_session(&text)
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await?;
        self.persist(Some(&session));
        self.events
            .emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }
}

#[async_trait::async_trait]
impl AuthBackend for HostedBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.load_session() else {
            return Ok(None);
        };
        if !session.expires_within(now_secs(), EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }

        match self.refresh_with(&session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(e @ BackendError::Network(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "stored session could not be refreshed; dropping it");
                self.persist(None);
                self.events.emit(AuthChangeEvent::SignedOut, None);
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpResponse, BackendError> {
        let req = self
            .http
            .post(self.auth_url("signup"))
            .bearer_auth(&self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password, "data": metadata }));
        let text = self.send(req).await?;
        let response = parse_sign_up(&text)?;

        if let Some(session) = &response.session {
            self.persist(Some(session));
            self.events
                .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        }
        info!(user_id = %response.user.id, confirmed = response.session.is_some(), "identity created");
        Ok(response)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("password", serde_json::json!({ "email": email, "password": password }))
            .await?;
        self.persist(Some(&session));
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let session = self.load_session();
        self.persist(None);
        self.events.emit(AuthChangeEvent::SignedOut, None);

        let Some(session) = session else {
            return Ok(());
        };
        let req = self
            .http
            .post(self.auth_url("logout"))
            .bearer_auth(&session.access_token);
        match self.send(req).await {
            // Token already unknown to the server: nothing left to revoke.
            Ok(_) | Err(BackendError::Api { status: 401 | 403 | 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError> {
        let mut req = self
            .http
            .post(self.auth_url("recover"))
            .bearer_auth(&self.anon_key)
            .json(&serde_json::json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            req = req.query(&[("redirect_to", redirect_to)]);
        }
        self.send(req).await?;
        Ok(())
    }

    async fn update_user(&self, password: &str) -> Result<User, BackendError> {
        let mut session = self.load_session().ok_or(BackendError::NoSession)?;
        let req = self
            .http
            .put(self.auth_url("user"))
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "password": password }));
        let text = self.send(req).await?;
        let user = parse_user(&text)?;

        session.user = user.clone();
        self.persist(Some(&session));
        self.events
            .emit(AuthChangeEvent::UserUpdated, Some(session));
        Ok(user)
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let session = self.load_session().ok_or(BackendError::NoSession)?;
        self.refresh_with(&session.refresh_token).await
    }

    async fn get_user(&self, access_token: &str) -> Result<User, BackendError> {
        let req = self
            .http
            .get(self.auth_url("user"))
            .bearer_auth(access_token);
        let text = self.send(req).await?;
        parse_user(&text)
    }

    fn storage_key(&self) -> String {
        self.storage_key.clone()
    }
}

// =============================================================================
// HTTP HELPERS
// =============================================================================

pub(crate) fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| BackendError::Network(format!("http client build failed: {e}")))
}

/// Read the body of a response, mapping non-success statuses to `BackendError::Api`.
pub(crate) async fn read_body(resp: reqwest::Response) -> Result<String, BackendError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(parse_error(status.as_u16(), &text));
    }
    Ok(text)
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn session_from_token(token: TokenResponse) -> Session {
    let expires_at = token
        .expires_at
        .unwrap_or_else(|| now_secs() + token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
    Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        token_type: token.token_type.unwrap_or_else(|| "bearer".to_owned()),
        user: token.user,
    }
}

pub(crate) fn parse_session(json: &str) -> Result<Session, BackendError> {
    let token: TokenResponse = serde_json::from_str(json).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(session_from_token(token))
}

/// Sign-up answers with a token response when the identity is confirmed
/// immediately, or with the bare user (top level or under `user`) when email
/// confirmation is pending.
pub(crate) fn parse_sign_up(json: &str) -> Result<SignUpResponse, BackendError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| BackendError::Decode(e.to_string()))?;
    if value.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
        let session = session_from_token(token);
        return Ok(SignUpResponse { user: session.user.clone(), session: Some(session) });
    }
    let user_value = value.get("user").cloned().unwrap_or(value);
    let user: User = serde_json::from_value(user_value).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(SignUpResponse { user, session: None })
}

pub(crate) fn parse_user(json: &str) -> Result<User, BackendError> {
    serde_json::from_str(json).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Normalize the GoTrue and PostgREST error shapes into one variant.
pub(crate) fn parse_error(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .or_else(|| match parsed.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        })
        .or(parsed.error);
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() { format!("HTTP {status}") } else { trimmed.to_owned() }
        });
    BackendError::Api { status, code, message }
}

#[cfg(test)]
#[path = "hosted_test.rs"]
mod tests;
