//! In-process store for local development and tests

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{GameStore, Identity, MatchRecord, StoreError};

/// Keeps identities and match history in memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    identities: Mutex<HashMap<Uuid, Identity>>,
    matches: Mutex<Vec<MatchRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_identity<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Identity) -> T,
    ) -> Result<T, StoreError> {
        self.identities
            .lock()
            .get_mut(&id)
            .map(f)
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Insert or replace an identity
    pub fn put_identity(&self, identity: Identity) {
        self.identities.lock().insert(identity.id, identity);
    }

    pub fn identity(&self, id: Uuid) -> Option<Identity> {
        self.identities.lock().get(&id).cloned()
    }

    pub fn match_records(&self) -> Vec<MatchRecord> {
        self.matches.lock().clone()
    }
}

impl GameStore for MemoryStore {
    fn get_identity(&self, id: Uuid) -> BoxFuture<'_, Result<Option<Identity>, StoreError>> {
        future::ready(Ok(self.identities.lock().get(&id).cloned())).boxed()
    }

    fn create_identity(
        &self,
        id: Uuid,
        username: String,
    ) -> BoxFuture<'_, Result<Identity, StoreError>> {
        let identity = self
            .identities
            .lock()
            .entry(id)
            .or_insert_with(|| Identity::new(id, username))
            .clone();
        future::ready(Ok(identity)).boxed()
    }

    fn set_rating(&self, id: Uuid, rating: i32) -> BoxFuture<'_, Result<(), StoreError>> {
        future::ready(self.with_identity(id, |identity| identity.mmr = rating)).boxed()
    }

    fn append_match_record(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        self.matches.lock().push(record);
        future::ready(Ok(())).boxed()
    }

    fn matches_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<MatchRecord>, StoreError>> {
        let rows = self
            .matches
            .lock()
            .iter()
            .filter(|m| m.ended_at > cutoff)
            .cloned()
            .collect();
        future::ready(Ok(rows)).boxed()
    }

    fn set_banned(&self, id: Uuid, reason: String) -> BoxFuture<'_, Result<(), StoreError>> {
        let result = self.with_identity(id, |identity| {
            identity.is_banned = true;
            identity.ban_reason = Some(reason);
        });
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ensure_identity, DEFAULT_RATING};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn ensure_identity_creates_once() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let first = assert_ok!(ensure_identity(&store, id, "alice").await);
        assert_eq!(first.mmr, DEFAULT_RATING);

        assert_ok!(store.set_rating(id, 1234).await);
        let second = assert_ok!(ensure_identity(&store, id, "renamed").await);
        assert_eq!(second.mmr, 1234);
        assert_eq!(second.username, "alice");
    }

    #[tokio::test]
    async fn rating_update_for_unknown_identity_fails() {
        let store = MemoryStore::new();
        assert_err!(store.set_rating(Uuid::new_v4(), 900).await);
    }

    #[tokio::test]
    async fn matches_since_filters_by_end_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for minutes_ago in [5, 45] {
            store
                .append_match_record(MatchRecord {
                    player1_id: a,
                    player2_id: b,
                    winner_id: Some(a),
                    duration_seconds: 70,
                    ended_at: now - chrono::Duration::minutes(minutes_ago),
                })
                .await
                .unwrap();
        }

        let recent = store
            .matches_since(now - chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(store.match_records().len(), 2);
    }
}
