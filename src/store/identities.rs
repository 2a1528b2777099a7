//! Identity rows: rating and ban state

use serde::Serialize;
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};
use super::Identity;

const TABLE: &str = "users";

/// New identity for insertion
#[derive(Debug, Clone, Serialize)]
struct NewIdentity<'a> {
    id: Uuid,
    username: &'a str,
    mmr: i32,
}

#[derive(Debug, Clone, Serialize)]
struct RatingUpdate {
    mmr: i32,
}

#[derive(Debug, Clone, Serialize)]
struct BanUpdate<'a> {
    is_banned: bool,
    ban_reason: &'a str,
}

/// Identity store operations
#[derive(Clone)]
pub struct IdentityStore {
    client: SupabaseClient,
}

impl IdentityStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get an identity by ID
    pub async fn get(&self, user_id: Uuid) -> Result<Option<Identity>, SupabaseError> {
        let query = format!(
            "id=eq.{}&select=id,username,mmr,is_banned,ban_reason",
            user_id
        );
        self.client.get_one(TABLE, &query).await
    }

    /// Create a new identity with the default rating
    pub async fn create(&self, user_id: Uuid, username: &str) -> Result<Identity, SupabaseError> {
        let row = NewIdentity {
            id: user_id,
            username,
            mmr: super::DEFAULT_RATING,
        };
        self.client.insert(TABLE, &row).await
    }

    pub async fn set_rating(&self, user_id: Uuid, rating: i32) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", user_id);
        self.client
            .update(TABLE, &query, &RatingUpdate { mmr: rating })
            .await
    }

    pub async fn set_banned(&self, user_id: Uuid, reason: &str) -> Result<(), SupabaseError> {
        let query = format!("id=eq.{}", user_id);
        let update = BanUpdate {
            is_banned: true,
            ban_reason: reason,
        };
        self.client.update(TABLE, &query, &update).await
    }
}
