//! PostgREST table client (`/rest/v1/<table>`).
//!
//! Requests carry the current session's access token so row-level security
//! applies; without a session the anon key is used.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::hosted::{build_http_client, read_body};
use super::{AuthBackend, BackendError};
use crate::config::BackendConfig;

/// PostgREST equality filter value.
pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    auth: Arc<dyn AuthBackend>,
}

impl RestClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, auth: Arc<dyn AuthBackend>) -> Result<Self, BackendError> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            auth,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let token = match self.auth.get_session().await? {
            Some(session) => session.access_token,
            None => self.anon_key.clone(),
        };
        let resp = req
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;
        read_body(resp).await
    }

    /// `GET` rows matching every `(column, filter)` pair.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let mut query = vec![("select", "*".to_owned())];
        query.extend_from_slice(filters);
        let req = self.http.get(self.table_url(table)).query(&query);
        let text = self.send(req).await?;
        decode(&text)
    }

    /// `POST` one row and return the stored representation.
    pub async fn insert<B: Serialize + Sync, T: DeserializeOwned>(&self, table: &str, body: &B) -> Result<T, BackendError> {
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(body);
        let text = self.send(req).await?;
        let rows: Vec<T> = decode(&text)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("insert into {table} returned no rows")))
    }

    /// `PATCH` rows matching the filters and return their new representation.
    pub async fn update<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, BackendError> {
        let req = self
            .http
            .patch(self.table_url(table))
            .query(filters)
            .header("Prefer", "return=representation")
            .json(body);
        let text = self.send(req).await?;
        decode(&text)
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    serde_json::from_str(text).map_err(|e| BackendError::Decode(e.to_string()))
}
