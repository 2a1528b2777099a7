//! Append-only match history

use chrono::{DateTime, SecondsFormat, Utc};

use super::supabase::{SupabaseClient, SupabaseError};
use super::MatchRecord;

const TABLE: &str = "match_history";

/// Match history operations
#[derive(Clone)]
pub struct MatchHistoryStore {
    client: SupabaseClient,
}

impl MatchHistoryStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn append(&self, record: &MatchRecord) -> Result<(), SupabaseError> {
        self.client.insert_minimal(TABLE, record).await
    }

    /// All matches that ended after `cutoff`
    pub async fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchRecord>, SupabaseError> {
        let query = format!(
            "ended_at=gt.{}&select=player1_id,player2_id,winner_id,duration_seconds,ended_at",
            cutoff.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        self.client.get(TABLE, &query).await
    }
}
