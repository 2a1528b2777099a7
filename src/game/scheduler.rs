//! Fixed-rate driver for every active session
//!
//! One task ticks all rooms at the simulation rate. Each room sits behind its
//! own mutex, shared with the lobby's input path, so a tick and an input for
//! the same room never interleave. A panic inside one room's tick drops that
//! room and leaves the others running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::util::time::{unix_millis, FULL_SNAPSHOT_INTERVAL, TICK_DURATION_MICROS};
use crate::ws::hub::ConnectionHub;
use crate::ws::protocol::ServerMsg;

use super::session::{GameSession, SessionEvent};
use super::snapshot::SnapshotBuilder;

/// A session plus its per-room sync state
pub struct SessionSlot {
    pub session: GameSession,
    pub builder: SnapshotBuilder,
}

impl SessionSlot {
    pub fn recipients(&self) -> [Uuid; 2] {
        self.session.player_ids()
    }
}

pub type SharedSlot = Arc<Mutex<SessionSlot>>;

/// Messages produced by one room's tick
type Outbound = Vec<ServerMsg>;

pub struct SyncScheduler {
    sessions: DashMap<Uuid, SharedSlot>,
    hub: Arc<ConnectionHub>,
}

impl SyncScheduler {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self {
            sessions: DashMap::new(),
            hub,
        }
    }

    pub fn register(&self, session: GameSession) -> SharedSlot {
        let room_id = session.room_id;
        let slot = Arc::new(Mutex::new(SessionSlot {
            session,
            builder: SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL),
        }));
        self.sessions.insert(room_id, slot.clone());
        info!(room_id = %room_id, "Session registered");
        slot
    }

    pub fn get(&self, room_id: Uuid) -> Option<SharedSlot> {
        self.sessions.get(&room_id).map(|s| s.value().clone())
    }

    pub fn deregister(&self, room_id: Uuid) -> bool {
        let removed = self.sessions.remove(&room_id).is_some();
        if removed {
            info!(room_id = %room_id, "Session deregistered");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Tick every room once
    pub fn tick_all(&self, now: u64) {
        // Clone the handles out so no map shard stays locked while a room runs
        let slots: Vec<(Uuid, SharedSlot)> = self
            .sessions
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        for (room_id, slot) in slots {
            let result = panic::catch_unwind(AssertUnwindSafe(|| tick_room(&slot, now)));
            match result {
                Ok(Some((recipients, messages))) => {
                    for msg in messages {
                        self.hub.send_all(&recipients, &msg);
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    error!(room_id = %room_id, "Session tick panicked, dropping room");
                    self.sessions.remove(&room_id);
                }
            }
        }
    }

    /// Run at the simulation rate until the process exits
    pub async fn run(self: Arc<Self>) {
        info!("Sync scheduler started");
        let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick_all(unix_millis());
        }
    }
}

/// Advance one room and collect what it has to say
fn tick_room(slot: &SharedSlot, now: u64) -> Option<([Uuid; 2], Outbound)> {
    let mut slot = slot.lock();
    let was_playing = slot.session.is_playing();
    if was_playing {
        slot.session.update(now);
    }

    // Events can also come from inputs handled between ticks, e.g. a
    // reported hit that ended round 2.
    let events = slot.session.take_events();
    if !was_playing && events.is_empty() {
        return None;
    }

    let mut out = Outbound::new();
    for event in events {
        match event {
            SessionEvent::RoundEnded {
                round,
                reason,
                scores,
            } => {
                out.push(ServerMsg::RoundEnd {
                    round,
                    reason,
                    scores,
                });
                slot.builder.force_next();
            }
            SessionEvent::MatchOver(outcome) => out.push(ServerMsg::MatchOver {
                winner: outcome.winner,
                scores: outcome.scores,
                duration_secs: outcome.duration_secs(),
            }),
        }
    }

    let view = slot.session.snapshot(now);
    if let Some(state) = slot.builder.build(view) {
        out.push(ServerMsg::State(state));
    }
    slot.session.clear_explosions();

    Some((slot.recipients(), out))
}
