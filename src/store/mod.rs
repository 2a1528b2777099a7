//! Persistence for identities and match history
//!
//! The server talks to storage only through [`GameStore`]. Production runs
//! against Supabase (PostgREST), local development and tests use the
//! in-memory store.

pub mod identities;
pub mod matches;
pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::{SupabaseClient, SupabaseError, SupabaseStore};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rating assigned to identities that have never played
pub const DEFAULT_RATING: i32 = 1000;

fn default_rating() -> i32 {
    DEFAULT_RATING
}

/// A player's persisted record (`users` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    #[serde(default = "default_rating")]
    pub mmr: i32,
    #[serde(default)]
    pub is_banned: bool,
    #[serde(default)]
    pub ban_reason: Option<String>,
}

impl Identity {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            mmr: DEFAULT_RATING,
            is_banned: false,
            ban_reason: None,
        }
    }
}

/// One finished match (`match_history` table, append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub player1_id: Uuid,
    pub player2_id: Uuid,
    /// `None` on a draw
    pub winner_id: Option<Uuid>,
    pub duration_seconds: u32,
    pub ended_at: DateTime<Utc>,
}

/// Storage operations the game server depends on
pub trait GameStore: Send + Sync {
    /// Look up an identity by id
    fn get_identity(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Identity>, StoreError>>;

    /// Insert a fresh identity with the default rating
    fn create_identity(
        &self,
        id: Uuid,
        username: String,
    ) -> BoxFuture<'_, Result<Identity, StoreError>>;

    fn set_rating(&self, id: Uuid, rating: i32) -> BoxFuture<'_, Result<(), StoreError>>;

    fn append_match_record(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Match rows that ended after `cutoff`, used by the abuse monitor
    fn matches_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<MatchRecord>, StoreError>>;

    fn set_banned(&self, id: Uuid, reason: String) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Get an identity, creating it on first sight
pub async fn ensure_identity(
    store: &dyn GameStore,
    id: Uuid,
    username: &str,
) -> Result<Identity, StoreError> {
    match store.get_identity(id).await? {
        Some(identity) => Ok(identity),
        None => store.create_identity(id, username.to_string()).await,
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Supabase(#[from] SupabaseError),

    #[error("Identity not found: {0}")]
    NotFound(Uuid),
}
