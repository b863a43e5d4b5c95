//! In-memory gym repository with a unique-email constraint.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use super::{Gym, GymRepository, GymStoreError, GymUpdate, NewGym};
use crate::backend::BackendError;

#[derive(Default)]
struct Inner {
    gyms: Vec<Gym>,
    offline: bool,
    lookup_delay: Duration,
}

#[derive(Default)]
pub struct MemoryGymRepository {
    inner: Mutex<Inner>,
}

impl MemoryGymRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), GymStoreError> {
        if self.lock().offline {
            return Err(BackendError::Network("gym table unreachable".to_owned()).into());
        }
        Ok(())
    }

    /// Insert a gym directly, bypassing the unique-email check.
    pub fn seed(&self, gym: Gym) {
        self.lock().gyms.push(gym);
    }

    /// When set, every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay lookups so concurrent callers interleave.
    pub fn set_lookup_delay(&self, delay: Duration) {
        self.lock().lookup_delay = delay;
    }

    #[must_use]
    pub fn all(&self) -> Vec<Gym> {
        self.lock().gyms.clone()
    }

    async fn pause(&self) {
        let delay = self.lock().lookup_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl GymRepository for MemoryGymRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Gym>, GymStoreError> {
        self.pause().await;
        self.check_online()?;
        Ok(self.lock().gyms.iter().find(|g| g.email == email).cloned())
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<Gym>, GymStoreError> {
        self.pause().await;
        self.check_online()?;
        Ok(self
            .lock()
            .gyms
            .iter()
            .find(|g| g.owner_id == Some(owner_id))
            .cloned())
    }

    async fn insert(&self, gym: &NewGym) -> Result<Gym, GymStoreError> {
        self.check_online()?;
        let mut inner = self.lock();
        if inner.gyms.iter().any(|g| g.email == gym.email) {
            return Err(GymStoreError::Conflict);
        }
        let created = Gym {
            id: Uuid::new_v4(),
            name: gym.name.clone(),
            email: gym.email.clone(),
            phone: None,
            company_name: None,
            address: None,
            owner_id: gym.owner_id,
        };
        inner.gyms.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: &GymUpdate) -> Result<Gym, GymStoreError> {
        self.check_online()?;
        let mut inner = self.lock();
        let gym = inner
            .gyms
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(GymStoreError::NotFound(id))?;
        update.apply(gym);
        Ok(gym.clone())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
