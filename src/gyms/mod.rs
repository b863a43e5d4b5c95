//! Gym records and their storage.
//!
//! DESIGN
//! ======
//! Each identity owns exactly one gym. Email is the authoritative key and is
//! stored normalized (trimmed, lowercase); `owner_id` is kept alongside so
//! gyms created by id-keyed call sites can still be found and adopted.
//! `GymRepository` is the storage seam with three implementations:
//! in-memory, hosted table API, and direct Postgres.

pub mod hosted;
pub mod memory;
pub mod postgres;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{BackendError, User};
use crate::error::ErrorCode;

pub use hosted::HostedGymRepository;
pub use memory::MemoryGymRepository;
pub use postgres::PgGymRepository;

pub const GYMS_TABLE: &str = "gyms";

// =============================================================================
// TYPES
// =============================================================================

/// A row of the `gyms` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gym {
    /// Primary key assigned by the store.
    pub id: Uuid,
    /// Display name shown in the dashboard header.
    pub name: String,
    /// Owner's normalized email; unique across gyms.
    pub email: String,
    /// Front-desk phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Legal entity name used on invoices.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Identity that owns the gym. Rows created before owner tracking have none.
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

/// Insert payload. `email` must already be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGym {
    /// Display name; falls back to the default gym name when blank.
    pub name: String,
    /// Owner's normalized email.
    pub email: String,
    /// Owning identity, when known at insert time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
}

/// Partial update from the settings flow. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GymUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
}

impl GymUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields to `gym`.
    pub fn apply(&self, gym: &mut Gym) {
        if let Some(name) = &self.name {
            gym.name.clone_from(name);
        }
        if let Some(phone) = &self.phone {
            gym.phone = Some(phone.clone());
        }
        if let Some(company_name) = &self.company_name {
            gym.company_name = Some(company_name.clone());
        }
        if let Some(address) = &self.address {
            gym.address = Some(address.clone());
        }
        if let Some(owner_id) = self.owner_id {
            gym.owner_id = Some(owner_id);
        }
    }
}

/// Identity a gym is provisioned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GymOwner {
    /// Normalized email.
    pub email: String,
    /// Backend user id; `None` when only the email is known.
    pub user_id: Option<Uuid>,
}

impl GymOwner {
    #[must_use]
    pub fn new(email: &str, user_id: Option<Uuid>) -> Self {
        Self { email: normalize_email(email), user_id }
    }

    #[must_use]
    pub fn from_user(user: &User) -> Self {
        Self::new(&user.email, Some(user.id))
    }
}

/// Trim and lowercase an email for use as a lookup key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GymStoreError {
    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("a gym already exists for this email")]
    Conflict,

    #[error("gym not found: {0}")]
    NotFound(Uuid),
}

impl ErrorCode for GymStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "E_GYM_BACKEND",
            Self::Db(_) => "E_GYM_DATABASE",
            Self::Conflict => "E_GYM_CONFLICT",
            Self::NotFound(_) => "E_GYM_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.retryable(),
            Self::Db(_) => true,
            Self::Conflict | Self::NotFound(_) => false,
        }
    }
}

// =============================================================================
// REPOSITORY
// =============================================================================

#[async_trait::async_trait]
pub trait GymRepository: Send + Sync {
    /// Gym whose email matches `email` (already normalized).
    async fn find_by_email(&self, email: &str) -> Result<Option<Gym>, GymStoreError>;

    /// Gym recorded as owned by `owner_id`.
    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<Gym>, GymStoreError>;

    /// Insert a gym. Fails with `Conflict` when the email is already taken.
    async fn insert(&self, gym: &NewGym) -> Result<Gym, GymStoreError>;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: Uuid, update: &GymUpdate) -> Result<Gym, GymStoreError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
