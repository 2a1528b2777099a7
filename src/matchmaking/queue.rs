//! Matchmaking queue implementation
//!
//! Waiting players are scanned in arrival order. The first entry whose rating
//! is within its tolerance of the newcomer's wins; tolerance grows the longer
//! that entry has been waiting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tolerance at zero wait
pub const BASE_TOLERANCE: f64 = 100.0;
/// Tolerance added per second waited
pub const TOLERANCE_PER_SEC: f64 = 50.0;

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: Uuid,
    pub display_name: String,
    pub rating: i32,
    pub queued_at: Instant,
}

impl QueueEntry {
    pub fn new(user_id: Uuid, display_name: String, rating: i32, queued_at: Instant) -> Self {
        Self {
            user_id,
            display_name,
            rating,
            queued_at,
        }
    }

    /// How long this player has been waiting as of `now`
    pub fn wait_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.queued_at)
    }
}

/// Result of joining the queue
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// Paired with this waiting opponent, who has left the queue
    Matched(QueueEntry),
    Waiting,
}

/// Rating distance accepted after waiting `waited`, optionally capped
pub fn tolerance(waited: Duration, cap: Option<u32>) -> f64 {
    let grown = BASE_TOLERANCE + TOLERANCE_PER_SEC * waited.as_secs_f64();
    match cap {
        Some(cap) => grown.min(f64::from(cap)),
        None => grown,
    }
}

/// The matchmaking queue
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueueEntry>,
    tolerance_cap: Option<u32>,
}

impl MatchmakingQueue {
    pub fn new(tolerance_cap: Option<u32>) -> Self {
        Self {
            queue: VecDeque::new(),
            tolerance_cap,
        }
    }

    /// Pair `entry` with the earliest compatible waiting player, or queue it
    pub fn enqueue(&mut self, entry: QueueEntry, now: Instant) -> EnqueueResult {
        // Rejoining replaces the old entry
        self.queue.retain(|p| p.user_id != entry.user_id);

        let found = self.queue.iter().position(|waiting| {
            let distance = f64::from((waiting.rating - entry.rating).abs());
            distance <= tolerance(waiting.wait_time(now), self.tolerance_cap)
        });

        match found.and_then(|idx| self.queue.remove(idx)) {
            Some(opponent) => EnqueueResult::Matched(opponent),
            None => {
                self.queue.push_back(entry);
                EnqueueResult::Waiting
            }
        }
    }

    /// Remove a player from the queue. Idempotent.
    pub fn cancel(&mut self, user_id: Uuid) -> Option<QueueEntry> {
        let pos = self.queue.iter().position(|p| p.user_id == user_id)?;
        self.queue.remove(pos)
    }

    /// Check if a player is in the queue
    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.queue.iter().any(|p| &p.user_id == user_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
