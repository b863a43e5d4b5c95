//! Member rows for a gym.
//!
//! Member CRUD lives in the UI layer; this module only provides the fetch
//! path, routed through `RecoveryController::guard_fetch` so a
//! permission-denied answer triggers connection recovery.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::BackendError;
use crate::backend::rest::{RestClient, eq};
use crate::services::recovery::RecoveryController;

pub const MEMBERS_TABLE: &str = "members";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    /// Gym the member belongs to.
    pub gym_id: Uuid,
    /// Full name.
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// `active` unless the table says otherwise.
    #[serde(default = "default_membership_status")]
    pub membership_status: String,
    /// RFC 3339 timestamp as returned by the table API.
    #[serde(default)]
    pub joined_at: Option<String>,
}

fn default_membership_status() -> String {
    "active".to_owned()
}

#[async_trait::async_trait]
pub trait MemberRepository: Send + Sync {
    async fn list_for_gym(&self, gym_id: Uuid) -> Result<Vec<Member>, BackendError>;
}

/// Fetch a gym's members, recovering the connection once on permission denial.
///
/// # Errors
///
/// Returns the fetch error when the connection cannot be repaired.
pub async fn list_members(
    recovery: &RecoveryController,
    repo: &dyn MemberRepository,
    gym_id: Uuid,
) -> Result<Vec<Member>, BackendError> {
    recovery.guard_fetch(|| repo.list_for_gym(gym_id)).await
}

// =============================================================================
// HOSTED
// =============================================================================

pub struct HostedMemberRepository {
    rest: Arc<RestClient>,
}

impl HostedMemberRepository {
    #[must_use]
    pub fn new(rest: Arc<RestClient>) -> Self {
        Self { rest }
    }
}

#[async_trait::async_trait]
impl MemberRepository for HostedMemberRepository {
    async fn list_for_gym(&self, gym_id: Uuid) -> Result<Vec<Member>, BackendError> {
        self.rest
            .select(MEMBERS_TABLE, &[("gym_id", eq(gym_id)), ("order", "joined_at.desc".to_owned())])
            .await
    }
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Default)]
struct MemoryMembers {
    members: Vec<Member>,
    denials_left: usize,
}

#[derive(Default)]
pub struct MemoryMemberRepository {
    inner: Mutex<MemoryMembers>,
}

impl MemoryMemberRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryMembers> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn seed(&self, member: Member) {
        self.lock().members.push(member);
    }

    /// Reject the next `count` fetches as a row-level-security denial.
    pub fn deny_next(&self, count: usize) {
        self.lock().denials_left = count;
    }
}

#[async_trait::async_trait]
impl MemberRepository for MemoryMemberRepository {
    async fn list_for_gym(&self, gym_id: Uuid) -> Result<Vec<Member>, BackendError> {
        let mut inner = self.lock();
        if inner.denials_left > 0 {
            inner.denials_left -= 1;
            return Err(BackendError::Api {
                status: 401,
                code: Some("42501".to_owned()),
                message: "permission denied for table members".to_owned(),
            });
        }
        Ok(inner
            .members
            .iter()
            .filter(|m| m.gym_id == gym_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "members_test.rs"]
mod tests;
