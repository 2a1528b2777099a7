//! Outbound routing to connected players
//!
//! Each socket registers the sending half of its outbound channel here. Game
//! and lobby code address players by id and never touch sockets directly.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::ServerMsg;

/// Capacity of each connection's outbound queue
pub const OUTBOUND_BUFFER: usize = 256;

struct Connection {
    id: u64,
    tx: mpsc::Sender<ServerMsg>,
}

pub struct ConnectionHub {
    connections: DashMap<Uuid, Connection>,
    next_id: AtomicU64,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection and return its id with the outbound receiver.
    /// A newer connection for the same player replaces the old one.
    pub fn register(&self, user_id: Uuid) -> (u64, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.connections.insert(user_id, Connection { id, tx }).is_some() {
            debug!(user_id = %user_id, "Replaced existing connection");
        }
        (id, rx)
    }

    /// Drop the connection, unless a newer one already replaced it.
    /// Returns `true` when the player has no connection left.
    pub fn unregister(&self, user_id: Uuid, connection_id: u64) -> bool {
        self.connections
            .remove_if(&user_id, |_, conn| conn.id == connection_id);
        !self.is_connected(user_id)
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn connected(&self) -> usize {
        self.connections.len()
    }

    /// Queue a message for one player. Never waits: a full or closed queue
    /// drops the message.
    pub fn send_to(&self, user_id: Uuid, msg: ServerMsg) -> bool {
        let Some(tx) = self.connections.get(&user_id).map(|c| c.tx.clone()) else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %user_id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn send_all(&self, user_ids: &[Uuid], msg: &ServerMsg) {
        for user_id in user_ids {
            self.send_to(*user_id, msg.clone());
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_connection_does_not_unregister_newer_one() {
        let hub = ConnectionHub::new();
        let user = Uuid::new_v4();
        let (old_id, _old_rx) = hub.register(user);
        let (_new_id, mut new_rx) = hub.register(user);

        assert!(!hub.unregister(user, old_id));
        assert!(hub.send_to(user, ServerMsg::Waiting));
        assert!(matches!(new_rx.try_recv(), Ok(ServerMsg::Waiting)));
    }

    #[test]
    fn unknown_player_is_not_reachable() {
        let hub = ConnectionHub::new();
        assert!(!hub.send_to(Uuid::new_v4(), ServerMsg::Pong { t: 1 }));
        assert_eq!(hub.connected(), 0);
    }
}
