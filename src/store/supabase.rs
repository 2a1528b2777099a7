//! Supabase REST API client using service_role key

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::identities::IdentityStore;
use super::matches::MatchHistoryStore;
use super::{GameStore, Identity, MatchRecord, StoreError};

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_role_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authed(self.client.get(&url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated POST request (insert) returning the new row
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        // PostgREST returns an array, get first element
        let results: Vec<R> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Insert without reading the row back
    pub async fn insert_minimal<T: Serialize>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authed(self.client.patch(&url))
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }
}

/// [`GameStore`] backed by the `users` and `match_history` tables
#[derive(Clone)]
pub struct SupabaseStore {
    identities: IdentityStore,
    matches: MatchHistoryStore,
}

impl SupabaseStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            identities: IdentityStore::new(client.clone()),
            matches: MatchHistoryStore::new(client),
        }
    }
}

impl GameStore for SupabaseStore {
    fn get_identity(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Identity>, StoreError>> {
        async move { Ok(self.identities.get(id).await?) }.boxed()
    }

    fn create_identity(
        &self,
        id: Uuid,
        username: String,
    ) -> BoxFuture<'_, Result<Identity, StoreError>> {
        async move { Ok(self.identities.create(id, &username).await?) }.boxed()
    }

    fn set_rating(&self, id: Uuid, rating: i32) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { Ok(self.identities.set_rating(id, rating).await?) }.boxed()
    }

    fn append_match_record(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { Ok(self.matches.append(&record).await?) }.boxed()
    }

    fn matches_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<MatchRecord>, StoreError>> {
        async move { Ok(self.matches.since(cutoff).await?) }.boxed()
    }

    fn set_banned(&self, id: Uuid, reason: String) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { Ok(self.identities.set_banned(id, &reason).await?) }.boxed()
    }
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}
