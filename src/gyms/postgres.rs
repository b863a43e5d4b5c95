//! Gym repository backed by a direct Postgres connection.
//!
//! The unique index on `gyms.email` makes concurrent inserts for the same
//! owner collapse to one row; the loser sees `Conflict`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Gym, GymRepository, GymStoreError, GymUpdate, NewGym};

const GYM_COLUMNS: &str = "id, name, email, phone, company_name, address, owner_id";

pub struct PgGymRepository {
    pool: PgPool,
}

impl PgGymRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn gym_from_row(row: &PgRow) -> Gym {
    Gym {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        company_name: row.get("company_name"),
        address: row.get("address"),
        owner_id: row.get("owner_id"),
    }
}

#[async_trait::async_trait]
impl GymRepository for PgGymRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Gym>, GymStoreError> {
        let row = sqlx::query(&format!("SELECT {GYM_COLUMNS} FROM gyms WHERE email = $1 LIMIT 1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(gym_from_row))
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<Gym>, GymStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {GYM_COLUMNS} FROM gyms WHERE owner_id = $1 ORDER BY created_at LIMIT 1"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(gym_from_row))
    }

    async fn insert(&self, gym: &NewGym) -> Result<Gym, GymStoreError> {
        let row = sqlx::query(&format!(
            r"INSERT INTO gyms (name, email, owner_id)
              VALUES ($1, $2, $3)
              ON CONFLICT (email) DO NOTHING
              RETURNING {GYM_COLUMNS}"
        ))
        .bind(&gym.name)
        .bind(&gym.email)
        .bind(gym.owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(gym_from_row).ok_or(GymStoreError::Conflict)
    }

    async fn update(&self, id: Uuid, update: &GymUpdate) -> Result<Gym, GymStoreError> {
        let row = sqlx::query(&format!(
            r"UPDATE gyms
              SET name = COALESCE($2, name),
                  phone = COALESCE($3, phone),
                  company_name = COALESCE($4, company_name),
                  address = COALESCE($5, address),
                  owner_id = COALESCE($6, owner_id),
                  updated_at = now()
              WHERE id = $1
              RETURNING {GYM_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.company_name.as_deref())
        .bind(update.address.as_deref())
        .bind(update.owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(gym_from_row)
            .ok_or(GymStoreError::NotFound(id))
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
