//! Periodic scan of recent match history for rating manipulation
//!
//! Two patterns are flagged inside a trailing window:
//! - an identity winning several very short matches (win trading / boosting)
//! - the same pair of identities meeting over and over (collusive queueing)
//!
//! Flagged identities are banned unless they already are.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{GameStore, MatchRecord, StoreError};

/// Detection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AbuseThresholds {
    /// Only matches that ended within this window are considered
    pub window: chrono::Duration,
    /// A win counts as "short" at or below this many seconds
    pub short_match_secs: u32,
    /// Short wins needed to flag the winner
    pub short_win_count: usize,
    /// Meetings needed to flag both members of a pair
    pub repeat_pair_count: usize,
}

impl Default for AbuseThresholds {
    fn default() -> Self {
        Self {
            window: chrono::Duration::minutes(30),
            short_match_secs: 10,
            short_win_count: 3,
            repeat_pair_count: 5,
        }
    }
}

/// An identity the detectors picked up, with the ban reason to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub user_id: Uuid,
    pub reason: String,
}

/// Run both detectors over `records`. Each identity appears at most once;
/// the short-win reason wins when both detectors fire.
pub fn detect(records: &[MatchRecord], now: DateTime<Utc>, thresholds: &AbuseThresholds) -> Vec<Flag> {
    let cutoff = now - thresholds.window;
    let window_minutes = thresholds.window.num_minutes();
    let recent: Vec<&MatchRecord> = records.iter().filter(|m| m.ended_at > cutoff).collect();

    // BTreeMap keeps the output order stable
    let mut short_wins: BTreeMap<Uuid, usize> = BTreeMap::new();
    for record in &recent {
        if let Some(winner) = record.winner_id {
            if record.duration_seconds <= thresholds.short_match_secs {
                *short_wins.entry(winner).or_default() += 1;
            }
        }
    }

    let mut pairs: BTreeMap<(Uuid, Uuid), usize> = BTreeMap::new();
    for record in &recent {
        let key = if record.player1_id <= record.player2_id {
            (record.player1_id, record.player2_id)
        } else {
            (record.player2_id, record.player1_id)
        };
        *pairs.entry(key).or_default() += 1;
    }

    let mut flags: Vec<Flag> = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for (user_id, count) in short_wins {
        if count >= thresholds.short_win_count && seen.insert(user_id) {
            flags.push(Flag {
                user_id,
                reason: format!(
                    "Detected {} suspicious short wins in {}m",
                    count, window_minutes
                ),
            });
        }
    }

    for ((a, b), count) in pairs {
        if count < thresholds.repeat_pair_count {
            continue;
        }
        for user_id in [a, b] {
            if seen.insert(user_id) {
                flags.push(Flag {
                    user_id,
                    reason: format!(
                        "Detected {} repeated matches with same opponent in {}m",
                        count, window_minutes
                    ),
                });
            }
        }
    }

    flags
}

/// Batch job that bans flagged identities
pub struct AbuseMonitor {
    store: Arc<dyn GameStore>,
    thresholds: AbuseThresholds,
    every: Duration,
}

impl AbuseMonitor {
    pub fn new(store: Arc<dyn GameStore>, thresholds: AbuseThresholds, every: Duration) -> Self {
        Self {
            store,
            thresholds,
            every,
        }
    }

    /// One scan. Returns the identities banned by this pass.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let records = self.store.matches_since(now - self.thresholds.window).await?;
        let flags = detect(&records, now, &self.thresholds);
        let mut banned = Vec::new();

        for flag in flags {
            match self.store.get_identity(flag.user_id).await {
                Ok(Some(identity)) if identity.is_banned => continue,
                Ok(_) => {}
                Err(e) => {
                    error!(user_id = %flag.user_id, error = %e, "Failed to read identity before ban");
                    continue;
                }
            }

            warn!(user_id = %flag.user_id, reason = %flag.reason, "Banning identity");
            match self.store.set_banned(flag.user_id, flag.reason).await {
                Ok(()) => banned.push(flag.user_id),
                Err(e) => error!(user_id = %flag.user_id, error = %e, "Failed to ban identity"),
            }
        }

        Ok(banned)
    }

    /// Run immediately, then on every interval
    pub async fn run(self) {
        info!(interval_secs = self.every.as_secs(), "Abuse monitor started");
        let mut ticker = interval(self.every);

        loop {
            ticker.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(banned) if !banned.is_empty() => {
                    info!(banned = banned.len(), "Abuse monitor pass complete");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Abuse monitor pass failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Identity, MemoryStore};

    fn record(p1: Uuid, p2: Uuid, winner: Option<Uuid>, secs: u32, ago_min: i64) -> MatchRecord {
        MatchRecord {
            player1_id: p1,
            player2_id: p2,
            winner_id: winner,
            duration_seconds: secs,
            ended_at: Utc::now() - chrono::Duration::minutes(ago_min),
        }
    }

    #[test]
    fn three_short_wins_flag_the_winner() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let records = vec![
            record(a, b, Some(a), 10, 1),
            record(a, c, Some(a), 4, 2),
            record(c, a, Some(a), 9, 3),
        ];
        let flags = detect(&records, Utc::now(), &AbuseThresholds::default());
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].user_id, a);
        assert!(flags[0].reason.contains("3 suspicious short wins"));
    }

    #[test]
    fn long_or_old_wins_are_ignored() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![
            record(a, b, Some(a), 11, 1),
            record(a, b, Some(a), 5, 1),
            record(a, b, Some(a), 5, 45),
            record(a, b, None, 5, 1),
        ];
        assert!(detect(&records, Utc::now(), &AbuseThresholds::default()).is_empty());
    }

    #[test]
    fn repeated_pairs_are_unordered() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let records: Vec<MatchRecord> = (0..5)
            .map(|i| {
                if i % 2 == 0 {
                    record(a, b, None, 120, 1)
                } else {
                    record(b, a, None, 120, 1)
                }
            })
            .collect();
        let flags = detect(&records, Utc::now(), &AbuseThresholds::default());
        let ids: Vec<Uuid> = flags.iter().map(|f| f.user_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[tokio::test]
    async fn bans_once_and_skips_already_banned() {
        let store = Arc::new(MemoryStore::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.put_identity(Identity::new(a, "a"));
        store.put_identity(Identity::new(b, "b"));
        for _ in 0..3 {
            store
                .append_match_record(record(a, b, Some(a), 8, 1))
                .await
                .unwrap();
        }

        let monitor = AbuseMonitor::new(
            store.clone(),
            AbuseThresholds::default(),
            Duration::from_secs(60),
        );

        let banned = monitor.run_once(Utc::now()).await.unwrap();
        assert_eq!(banned, vec![a]);
        let identity = store.identity(a).unwrap();
        assert!(identity.is_banned);
        assert!(identity.ban_reason.is_some());
        assert!(!store.identity(b).unwrap().is_banned);

        let again = monitor.run_once(Utc::now()).await.unwrap();
        assert!(again.is_empty());
    }
}
