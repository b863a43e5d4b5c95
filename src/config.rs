//! Application configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = ".gymdesk";
pub const DEFAULT_SITE_URL: &str = "http://localhost:5173";
pub const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_RECOVERY_DEBOUNCE_SECS: u64 = 10;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_TOKEN_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TOAST_DURATION_SECS: u64 = 5;
pub const DEFAULT_SESSION_INIT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_WAIT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },
    #[error("config parse failed: {0}")]
    Parse(String),
}

// =============================================================================
// TIMINGS
// =============================================================================

/// Every timer and bound used by the auth lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Minimum spacing between two recovery attempts.
    pub recovery_debounce: Duration,
    /// Period of the connection health check while a session exists.
    pub health_check_interval: Duration,
    /// Period of the unconditional token refresh while a session exists.
    pub token_refresh_interval: Duration,
    /// How long non-destructive notifications stay visible.
    pub toast_duration: Duration,
    /// Bound on the initial session fetch at mount.
    pub session_init_timeout: Duration,
    /// Bound on waiting for the store to reflect a new session.
    pub session_wait_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            recovery_debounce: Duration::from_secs(DEFAULT_RECOVERY_DEBOUNCE_SECS),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            token_refresh_interval: Duration::from_secs(DEFAULT_TOKEN_REFRESH_INTERVAL_SECS),
            toast_duration: Duration::from_secs(DEFAULT_TOAST_DURATION_SECS),
            session_init_timeout: Duration::from_secs(DEFAULT_SESSION_INIT_TIMEOUT_SECS),
            session_wait_timeout: Duration::from_millis(DEFAULT_SESSION_WAIT_TIMEOUT_MS),
        }
    }
}

impl Timings {
    /// Defaults overridden by any parseable env var. Zero is rejected for
    /// timer periods and timeouts.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            recovery_debounce: Duration::from_secs(env_parse("RECOVERY_DEBOUNCE_SECS", DEFAULT_RECOVERY_DEBOUNCE_SECS)),
            health_check_interval: Duration::from_secs(env_parse_nonzero(
                "HEALTH_CHECK_INTERVAL_SECS",
                DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            )),
            token_refresh_interval: Duration::from_secs(env_parse_nonzero(
                "TOKEN_REFRESH_INTERVAL_SECS",
                DEFAULT_TOKEN_REFRESH_INTERVAL_SECS,
            )),
            toast_duration: Duration::from_secs(env_parse("TOAST_DURATION_SECS", DEFAULT_TOAST_DURATION_SECS)),
            session_init_timeout: Duration::from_secs(env_parse_nonzero(
                "SESSION_INIT_TIMEOUT_SECS",
                DEFAULT_SESSION_INIT_TIMEOUT_SECS,
            )),
            session_wait_timeout: Duration::from_millis(env_parse_nonzero(
                "SESSION_WAIT_TIMEOUT_MS",
                DEFAULT_SESSION_WAIT_TIMEOUT_MS,
            )),
        }
    }
}

// =============================================================================
// BACKEND CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without trailing slash, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Public API key sent as the `apikey` header.
    pub anon_key: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl BackendConfig {
    #[must_use]
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            anon_key: anon_key.to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Project reference used to namespace the persisted session key: the
    /// first host label (`abcd` for `https://abcd.supabase.co`).
    #[must_use]
    pub fn project_ref(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_owned()))
            .unwrap_or_else(|| "local".to_owned())
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: BackendConfig,
    /// Direct Postgres URL; when set, gyms are provisioned through SQL.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub data_dir: PathBuf,
    /// Base URL used to build password-reset redirect links.
    pub site_url: String,
    pub timings: Timings,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `DATABASE_URL`
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `GYMDESK_DATA_DIR`: default `.gymdesk`
    /// - `GYMDESK_SITE_URL`: default `http://localhost:5173`
    /// - `HTTP_REQUEST_TIMEOUT_SECS` / `HTTP_CONNECT_TIMEOUT_SECS`
    /// - timing overrides, see [`Timings::from_env`]
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the backend URL
    /// is not a valid http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SUPABASE_URL").map_err(|_| ConfigError::Missing { var: "SUPABASE_URL" })?;
        let anon_key =
            std::env::var("SUPABASE_ANON_KEY").map_err(|_| ConfigError::Missing { var: "SUPABASE_ANON_KEY" })?;
        validate_url(&url)?;

        let mut backend = BackendConfig::new(&url, &anon_key);
        backend.request_timeout =
            Duration::from_secs(env_parse_nonzero("HTTP_REQUEST_TIMEOUT_SECS", DEFAULT_HTTP_REQUEST_TIMEOUT_SECS));
        backend.connect_timeout =
            Duration::from_secs(env_parse_nonzero("HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS));

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let data_dir = std::env::var("GYMDESK_DATA_DIR").map_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let site_url = std::env::var("GYMDESK_SITE_URL")
            .unwrap_or_else(|_| DEFAULT_SITE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            backend,
            database_url,
            db_max_connections: env_parse_nonzero("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            data_dir,
            site_url,
            timings: Timings::from_env(),
        })
    }
}

fn validate_url(raw: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(raw).map_err(|e| ConfigError::Parse(format!("invalid SUPABASE_URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Parse(format!("unsupported SUPABASE_URL scheme '{}'", url.scheme())));
    }
    Ok(())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Like `env_parse`, but a zero value also falls back to `default`.
fn env_parse_nonzero<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + Default + PartialEq,
{
    let value = env_parse(key, default);
    if value == T::default() { default } else { value }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
