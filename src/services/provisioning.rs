//! Gym provisioning: every authenticated identity owns exactly one gym.
//!
//! DESIGN
//! ======
//! Lookup order is email first (authoritative), then owner id so gyms
//! created by id-keyed call sites are adopted instead of duplicated. When
//! neither finds a gym, one is inserted with the requested or default name.
//!
//! INVARIANTS
//! ==========
//! - Concurrent calls for the same email inside this process are serialized
//!   through a per-email gate, so only one of them can reach the insert.
//! - Across processes, the repository's unique-email constraint turns the
//!   losing insert into `Conflict`, which is resolved by re-reading.
//! - Provisioning failures never abort the calling auth flow;
//!   `provision_or_warn` logs and surfaces a warning instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::gyms::{Gym, GymOwner, GymRepository, GymStoreError, GymUpdate, NewGym};
use crate::notify::{Notification, Notifier};

pub const DEFAULT_GYM_NAME: &str = "My Gym";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("gym owner has no email")]
    MissingEmail,

    #[error(transparent)]
    Store(#[from] GymStoreError),

    #[error("gym insert for {0} conflicted but no gym was found")]
    Vanished(String),
}

impl ErrorCode for ProvisionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingEmail => "E_PROVISION_NO_EMAIL",
            Self::Store(e) => e.error_code(),
            Self::Vanished(_) => "E_PROVISION_VANISHED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::MissingEmail => false,
            Self::Store(e) => e.retryable(),
            Self::Vanished(_) => true,
        }
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct GymProvisioner {
    repo: Arc<dyn GymRepository>,
    notifier: Notifier,
    in_flight: Mutex<HashMap<String, Gate>>,
}

impl GymProvisioner {
    #[must_use]
    pub fn new(repo: Arc<dyn GymRepository>, notifier: Notifier) -> Self {
        Self { repo, notifier, in_flight: Mutex::new(HashMap::new()) }
    }

    fn gates(&self) -> std::sync::MutexGuard<'_, HashMap<String, Gate>> {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn acquire_gate(&self, email: &str) -> Gate {
        Arc::clone(self.gates().entry(email.to_owned()).or_default())
    }

    fn release_gate(&self, email: &str, gate: &Gate) {
        let mut gates = self.gates();
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(gate) <= 2 {
            gates.remove(email);
        }
    }

    /// Return the owner's gym, creating it if absent. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner has no email or the repository fails.
    pub async fn ensure_gym_exists(&self, owner: &GymOwner, name: Option<&str>) -> Result<Gym, ProvisionError> {
        if owner.email.is_empty() {
            return Err(ProvisionError::MissingEmail);
        }
        let gate = self.acquire_gate(&owner.email);
        let result = {
            let _turn = gate.lock().await;
            self.find_or_create(owner, name).await
        };
        self.release_gate(&owner.email, &gate);
        result
    }

    async fn find_or_create(&self, owner: &GymOwner, name: Option<&str>) -> Result<Gym, ProvisionError> {
        if let Some(gym) = self.repo.find_by_email(&owner.email).await? {
            return Ok(self.claim(gym, owner).await);
        }

        if let Some(user_id) = owner.user_id {
            if let Some(gym) = self.repo.find_by_owner(user_id).await? {
                info!(gym_id = %gym.id, email = %owner.email, "adopting gym keyed by owner id");
                return Ok(gym);
            }
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_GYM_NAME);
        let new_gym = NewGym { name: name.to_owned(), email: owner.email.clone(), owner_id: owner.user_id };
        match self.repo.insert(&new_gym).await {
            Ok(gym) => {
                info!(gym_id = %gym.id, email = %owner.email, name = %gym.name, "gym provisioned");
                Ok(gym)
            }
            Err(GymStoreError::Conflict) => {
                info!(email = %owner.email, "gym created concurrently; re-reading");
                self.repo
                    .find_by_email(&owner.email)
                    .await?
                    .ok_or_else(|| ProvisionError::Vanished(owner.email.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the owner id on an email-keyed gym that lacks one.
    async fn claim(&self, gym: Gym, owner: &GymOwner) -> Gym {
        let Some(user_id) = owner.user_id else {
            return gym;
        };
        if gym.owner_id.is_some() {
            return gym;
        }
        let update = GymUpdate { owner_id: Some(user_id), ..GymUpdate::default() };
        match self.repo.update(gym.id, &update).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(gym_id = %gym.id, error = %e, "failed to record gym owner");
                gym
            }
        }
    }

    /// Provision without failing the caller: errors are logged and surfaced
    /// as a warning notification.
    pub async fn provision_or_warn(&self, owner: &GymOwner, name: Option<&str>) -> Option<Gym> {
        match self.ensure_gym_exists(owner, name).await {
            Ok(gym) => Some(gym),
            Err(e) => {
                error!(email = %owner.email, error = %e, code = e.error_code(), "gym provisioning failed");
                self.notifier.notify(Notification::warning(
                    "Gym setup incomplete",
                    "We couldn't finish setting up your gym. You can retry from settings.",
                ));
                None
            }
        }
    }

    /// Run `provision_or_warn` on a background task.
    pub fn provision_in_background(self: &Arc<Self>, owner: GymOwner, name: Option<String>) -> JoinHandle<Option<Gym>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.provision_or_warn(&owner, name.as_deref()).await })
    }

    /// Look up the owner's gym without creating one.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn find_gym(&self, owner: &GymOwner) -> Result<Option<Gym>, ProvisionError> {
        if let Some(gym) = self.repo.find_by_email(&owner.email).await? {
            return Ok(Some(gym));
        }
        match owner.user_id {
            Some(user_id) => Ok(self.repo.find_by_owner(user_id).await?),
            None => Ok(None),
        }
    }

    /// Apply a settings change and report the result to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the gym does not exist or the repository fails.
    pub async fn update_gym(&self, id: Uuid, update: &GymUpdate) -> Result<Gym, ProvisionError> {
        match self.repo.update(id, update).await {
            Ok(gym) => {
                info!(gym_id = %id, "gym updated");
                self.notifier
                    .notify(Notification::success("Gym updated", "Your gym details have been saved."));
                Ok(gym)
            }
            Err(e) => {
                warn!(gym_id = %id, error = %e, "gym update failed");
                self.notifier
                    .notify(Notification::warning("Update failed", "We couldn't save your gym details."));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "provisioning_test.rs"]
mod tests;
