//! Gym repository over the hosted table API.

use std::sync::Arc;

use uuid::Uuid;

use super::{GYMS_TABLE, Gym, GymRepository, GymStoreError, GymUpdate, NewGym};
use crate::backend::BackendError;
use crate::backend::rest::{RestClient, eq};

/// Postgres unique-violation SQLSTATE, passed through by the table API.
const UNIQUE_VIOLATION: &str = "23505";

pub struct HostedGymRepository {
    rest: Arc<RestClient>,
}

impl HostedGymRepository {
    #[must_use]
    pub fn new(rest: Arc<RestClient>) -> Self {
        Self { rest }
    }

    async fn find_one(&self, column: &str, value: String) -> Result<Option<Gym>, GymStoreError> {
        let rows: Vec<Gym> = self
            .rest
            .select(GYMS_TABLE, &[(column, value), ("limit", "1".to_owned())])
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn is_unique_violation(err: &BackendError) -> bool {
    match err {
        BackendError::Api { status, code, .. } => *status == 409 || code.as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[async_trait::async_trait]
impl GymRepository for HostedGymRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Gym>, GymStoreError> {
        self.find_one("email", eq(email)).await
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<Gym>, GymStoreError> {
        self.find_one("owner_id", eq(owner_id)).await
    }

    async fn insert(&self, gym: &NewGym) -> Result<Gym, GymStoreError> {
        match self.rest.insert(GYMS_TABLE, gym).await {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => Err(GymStoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: Uuid, update: &GymUpdate) -> Result<Gym, GymStoreError> {
        let rows: Vec<Gym> = self
            .rest
            .update(GYMS_TABLE, &[("id", eq(id))], update)
            .await?;
        rows.into_iter()
            .next()
            .ok_or(GymStoreError::NotFound(id))
    }
}
