//! Lobby service - routes client requests to the queue, rooms and sessions
//!
//! The lobby owns the matchmaking queue and the room registry. Sessions live
//! in the [`SyncScheduler`]; the lobby creates them when both players are
//! ready and finalizes them (ratings, history, cleanup) when they end.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::{GameSession, InputOutcome, MatchOutcome, SyncScheduler};
use crate::rating::elo;
use crate::store::{GameStore, MatchRecord, DEFAULT_RATING};
use crate::util::time::unix_millis;
use crate::ws::hub::ConnectionHub;
use crate::ws::protocol::{
    ClientMsg, PlayerAction, PlayerCharacter, PlayerRole, RatingEntry, Role, RoomSummary,
    ServerMsg,
};

use super::queue::{EnqueueResult, MatchmakingQueue, QueueEntry};
use super::rooms::{RoomError, RoomMember, RoomRegistry, RoomStatus};

/// Characters handed out when a player readies without picking one
pub const DEFAULT_CHARACTERS: [&str; 2] = ["mort", "doux"];

/// An authenticated connection as the lobby sees it
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Lobby service
pub struct Lobby {
    queue: Mutex<MatchmakingQueue>,
    rooms: SyncMutex<RoomRegistry>,
    scheduler: Arc<SyncScheduler>,
    hub: Arc<ConnectionHub>,
    store: Arc<dyn GameStore>,
    config: GameConfig,
    outcome_tx: mpsc::UnboundedSender<MatchOutcome>,
    outcome_rx: SyncMutex<Option<mpsc::UnboundedReceiver<MatchOutcome>>>,
}

impl Lobby {
    pub fn new(
        scheduler: Arc<SyncScheduler>,
        hub: Arc<ConnectionHub>,
        store: Arc<dyn GameStore>,
        config: GameConfig,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            queue: Mutex::new(MatchmakingQueue::new(config.tolerance_cap)),
            rooms: SyncMutex::new(RoomRegistry::new()),
            scheduler,
            hub,
            store,
            config,
            outcome_tx,
            outcome_rx: SyncMutex::new(Some(outcome_rx)),
        }
    }

    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.rooms.lock().list_open()
    }

    pub fn room_summary(&self, room_id: Uuid) -> Option<RoomSummary> {
        self.rooms.lock().get(room_id).map(|room| room.summary())
    }

    fn reply(&self, user_id: Uuid, msg: ServerMsg) {
        self.hub.send_to(user_id, msg);
    }

    fn reply_error(&self, user_id: Uuid, code: &str, message: impl Into<String>) {
        self.reply(user_id, ServerMsg::error(code, message));
    }

    fn reply_room_error(&self, user_id: Uuid, err: RoomError) {
        self.reply_error(user_id, err.code(), err.to_string());
    }

    /// Current rating for a participant. Banned identities are refused.
    async fn member(&self, player: &Participant) -> Result<RoomMember, ServerMsg> {
        let rating = match self.store.get_identity(player.user_id).await {
            Ok(Some(identity)) if identity.is_banned => {
                return Err(ServerMsg::error(
                    "banned",
                    identity.ban_reason.unwrap_or_else(|| "Account banned".to_string()),
                ));
            }
            Ok(Some(identity)) => identity.mmr,
            Ok(None) => DEFAULT_RATING,
            Err(e) => {
                error!(user_id = %player.user_id, error = %e, "Rating lookup failed, using default");
                DEFAULT_RATING
            }
        };
        Ok(RoomMember {
            user_id: player.user_id,
            display_name: player.display_name.clone(),
            rating,
        })
    }

    /// Handle one inbound message from `player`
    pub async fn handle_message(&self, player: &Participant, msg: ClientMsg) {
        let user_id = player.user_id;
        match msg {
            ClientMsg::FindMatch => self.find_match(player).await,
            ClientMsg::CancelMatch => {
                self.queue.lock().await.cancel(user_id);
                self.reply(user_id, ServerMsg::MatchCancelled);
            }
            ClientMsg::CreateRoom => self.create_room(player).await,
            ClientMsg::JoinRoom { room_id } => self.join_room(player, room_id).await,
            ClientMsg::LeaveRoom { room_id } => {
                if let Err(e) = self.leave_room(user_id, room_id) {
                    self.reply_room_error(user_id, e);
                }
            }
            ClientMsg::ListRooms => {
                let rooms = self.list_rooms();
                self.reply(user_id, ServerMsg::RoomList { rooms });
            }
            ClientMsg::SelectCharacter { room_id, char_id } => {
                self.select_character(user_id, room_id, char_id);
            }
            ClientMsg::Ready { room_id, char_id } => self.ready(user_id, room_id, char_id),
            ClientMsg::PlayerInput { room_id, input } => self.player_input(user_id, room_id, input),
            ClientMsg::ReportCollision { room_id } => self.report_collision(user_id, room_id),
            ClientMsg::Ping { t } => self.reply(user_id, ServerMsg::Pong { t }),
        }
    }

    async fn find_match(&self, player: &Participant) {
        let user_id = player.user_id;
        if self.rooms.lock().room_of(user_id).is_some() {
            self.reply_room_error(user_id, RoomError::AlreadyInRoom);
            return;
        }
        let me = match self.member(player).await {
            Ok(member) => member,
            Err(msg) => return self.reply(user_id, msg),
        };

        let entry = QueueEntry::new(user_id, me.display_name.clone(), me.rating, Instant::now());
        let result = self.queue.lock().await.enqueue(entry, Instant::now());

        match result {
            EnqueueResult::Waiting => {
                debug!(user_id = %user_id, rating = me.rating, "Waiting for opponent");
                self.reply(user_id, ServerMsg::Waiting);
            }
            EnqueueResult::Matched(opponent) => {
                // The earlier arrival runs first
                let first = RoomMember {
                    user_id: opponent.user_id,
                    display_name: opponent.display_name,
                    rating: opponent.rating,
                };
                let created = {
                    let mut rooms = self.rooms.lock();
                    rooms
                        .create_matched(first, me)
                        .map(|room| (room.id, room.players.iter().map(RoomMember::info).collect::<Vec<_>>()))
                };
                match created {
                    Ok((room_id, players)) => {
                        info!(room_id = %room_id, "Quick match formed");
                        let ids: Vec<Uuid> = players.iter().map(|p| p.user_id).collect();
                        self.hub
                            .send_all(&ids, &ServerMsg::Matched { room_id, players });
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Quick match could not form a room");
                        self.reply_room_error(user_id, e);
                    }
                }
            }
        }
    }

    async fn create_room(&self, player: &Participant) {
        let user_id = player.user_id;
        let host = match self.member(player).await {
            Ok(member) => member,
            Err(msg) => return self.reply(user_id, msg),
        };
        self.queue.lock().await.cancel(user_id);

        let created = self.rooms.lock().create_room(host).map(|room| room.info());
        match created {
            Ok(room) => self.reply(user_id, ServerMsg::RoomJoined { room }),
            Err(e) => self.reply_room_error(user_id, e),
        }
    }

    async fn join_room(&self, player: &Participant, room_id: Uuid) {
        let user_id = player.user_id;
        let member = match self.member(player).await {
            Ok(member) => member,
            Err(msg) => return self.reply(user_id, msg),
        };
        self.queue.lock().await.cancel(user_id);

        let joined = self
            .rooms
            .lock()
            .join(room_id, member)
            .map(|room| (room.member_ids(), room.info()));
        match joined {
            Ok((ids, room)) => self.hub.send_all(&ids, &ServerMsg::RoomJoined { room }),
            Err(e) => self.reply_room_error(user_id, e),
        }
    }

    /// Remove `user_id` from a room and tell whoever is left
    pub fn leave_room(&self, user_id: Uuid, room_id: Uuid) -> Result<(), RoomError> {
        let departure = self.rooms.lock().leave(room_id, user_id)?;

        self.hub
            .send_all(&departure.remaining, &ServerMsg::OpponentLeft { player_id: user_id });
        if departure.room_deleted {
            self.scheduler.deregister(room_id);
        }
        info!(room_id = %room_id, user_id = %user_id, "Player left room");
        Ok(())
    }

    fn select_character(&self, user_id: Uuid, room_id: Uuid, char_id: String) {
        let result = {
            let mut rooms = self.rooms.lock();
            rooms
                .select_character(room_id, user_id, &char_id)
                .and_then(|()| rooms.get(room_id).map(|r| r.member_ids()).ok_or(RoomError::RoomNotFound))
        };
        match result {
            Ok(ids) => self.hub.send_all(
                &ids,
                &ServerMsg::CharSelected {
                    player_id: user_id,
                    char_id,
                },
            ),
            Err(RoomError::CharacterTaken) => self.reply(
                user_id,
                ServerMsg::CharSelectRejected {
                    char_id,
                    reason: RoomError::CharacterTaken.to_string(),
                },
            ),
            Err(e) => self.reply_room_error(user_id, e),
        }
    }

    fn ready(&self, user_id: Uuid, room_id: Uuid, char_id: Option<String>) {
        let mut rooms = self.rooms.lock();

        if let Some(char_id) = char_id {
            match rooms.select_character(room_id, user_id, &char_id) {
                Ok(()) => {}
                Err(RoomError::CharacterTaken) => {
                    drop(rooms);
                    return self.reply(
                        user_id,
                        ServerMsg::CharSelectRejected {
                            char_id,
                            reason: RoomError::CharacterTaken.to_string(),
                        },
                    );
                }
                Err(e) => {
                    drop(rooms);
                    return self.reply_room_error(user_id, e);
                }
            }
        }

        let (ready_count, total) = match rooms.mark_ready(room_id, user_id) {
            Ok(counts) => counts,
            Err(e) => {
                drop(rooms);
                return self.reply_room_error(user_id, e);
            }
        };
        let Some(room) = rooms.get(room_id) else {
            return;
        };
        let ids = room.member_ids();
        let should_start = ready_count == 2 && total == 2 && room.status == RoomStatus::Ready;
        drop(rooms);

        self.hub
            .send_all(&ids, &ServerMsg::ReadyUpdate { ready_count, total });
        if should_start {
            self.start_match(room_id);
        }
    }

    /// Build the session for a room whose two players are ready
    fn start_match(&self, room_id: Uuid) {
        let (players, ids) = {
            let mut rooms = self.rooms.lock();
            let Some(room) = rooms.get(room_id) else {
                return;
            };
            if room.players.len() != 2 || room.status != RoomStatus::Ready {
                return;
            }

            let mut picks: Vec<String> = Vec::with_capacity(2);
            for member in &room.players {
                let picked = room.characters.get(&member.user_id).cloned().unwrap_or_else(|| {
                    DEFAULT_CHARACTERS
                        .iter()
                        .find(|c| {
                            !room.characters.values().any(|taken| taken == *c)
                                && !picks.iter().any(|p| p == *c)
                        })
                        .unwrap_or(&DEFAULT_CHARACTERS[0])
                        .to_string()
                });
                picks.push(picked);
            }

            let players: [(Uuid, String); 2] = [
                (room.players[0].user_id, picks[0].clone()),
                (room.players[1].user_id, picks[1].clone()),
            ];
            let ids = room.member_ids();
            rooms.set_status(room_id, RoomStatus::Playing);
            (players, ids)
        };

        let characters: Vec<PlayerCharacter> = players
            .iter()
            .map(|(player_id, char_id)| PlayerCharacter {
                player_id: *player_id,
                char_id: char_id.clone(),
            })
            .collect();
        let roles = vec![
            PlayerRole {
                player_id: players[0].0,
                role: Role::Runner,
            },
            PlayerRole {
                player_id: players[1].0,
                role: Role::Attacker,
            },
        ];

        let mut session = GameSession::new(room_id, players);
        let outcome_tx = self.outcome_tx.clone();
        session.set_on_match_over(Box::new(move |outcome| {
            if outcome_tx.send(outcome).is_err() {
                error!(room_id = %room_id, "Match finalizer is gone, outcome dropped");
            }
        }));
        session.start(unix_millis());
        self.scheduler.register(session);

        self.hub.send_all(
            &ids,
            &ServerMsg::MatchStart {
                round: 1,
                roles,
                characters,
            },
        );
        info!(room_id = %room_id, "Match started");
    }

    fn player_input(&self, user_id: Uuid, room_id: Uuid, input: PlayerAction) {
        let Some(slot) = self.scheduler.get(room_id) else {
            return self.reply_error(user_id, "no_session", "No game running in this room");
        };

        let (outcome, opponent) = {
            let mut slot = slot.lock();
            let Some(idx) = slot.session.index_of(user_id) else {
                drop(slot);
                return self.reply_room_error(user_id, RoomError::NotInRoom);
            };
            let opponent = slot.session.players[1 - idx].user_id;
            (slot.session.handle_input(user_id, input, unix_millis()), opponent)
        };

        match outcome {
            InputOutcome::Applied => self.reply(
                opponent,
                ServerMsg::OpponentInput {
                    player_id: user_id,
                    input,
                },
            ),
            InputOutcome::Rejected(code) => {
                self.reply_error(user_id, code, format!("{:?} rejected", input));
            }
            InputOutcome::Ignored => {}
        }
    }

    fn report_collision(&self, user_id: Uuid, room_id: Uuid) {
        if !self.config.trust_client_collision {
            debug!(user_id = %user_id, room_id = %room_id, "Ignoring client collision report");
            return;
        }
        let Some(slot) = self.scheduler.get(room_id) else {
            return self.reply_error(user_id, "no_session", "No game running in this room");
        };
        let outcome = slot.lock().session.report_collision(user_id);
        debug!(user_id = %user_id, room_id = %room_id, outcome = ?outcome, "Collision reported");
    }

    /// Connection closed: leave the queue and any room
    pub async fn disconnect(&self, user_id: Uuid) {
        self.queue.lock().await.cancel(user_id);

        let room_id = self.rooms.lock().room_of(user_id);
        if let Some(room_id) = room_id {
            if let Err(e) = self.leave_room(user_id, room_id) {
                warn!(user_id = %user_id, error = %e, "Failed to leave room on disconnect");
            }
        }
        info!(user_id = %user_id, "Player disconnected from lobby");
    }

    /// Apply a finished match: ratings, broadcast, history, delayed cleanup
    pub async fn finalize(self: &Arc<Self>, outcome: MatchOutcome) {
        let room_id = outcome.room_id;
        let [a, b] = outcome.player_ids;

        // Ratings captured at join time; the store is only asked for a
        // player who already left the room.
        let cached = {
            let mut rooms = self.rooms.lock();
            rooms.set_status(room_id, RoomStatus::Finished);
            rooms.get(room_id).map(|room| {
                (
                    room.member(a).map(|m| m.rating),
                    room.member(b).map(|m| m.rating),
                )
            })
        };
        let (cached_a, cached_b) = cached.unwrap_or((None, None));
        let old_a = match cached_a {
            Some(r) => r,
            None => self.stored_rating(a).await,
        };
        let old_b = match cached_b {
            Some(r) => r,
            None => self.stored_rating(b).await,
        };

        let a_won = outcome.winner.map(|w| w == a);
        let (new_a, new_b) = elo::apply(old_a, old_b, a_won);

        self.hub.send_all(
            &outcome.player_ids,
            &ServerMsg::RatingUpdate {
                ratings: vec![
                    RatingEntry {
                        player_id: a,
                        old_rating: old_a,
                        new_rating: new_a,
                    },
                    RatingEntry {
                        player_id: b,
                        old_rating: old_b,
                        new_rating: new_b,
                    },
                ],
            },
        );

        if a_won.is_some() {
            for (id, rating) in [(a, new_a), (b, new_b)] {
                if let Err(e) = self.store.set_rating(id, rating).await {
                    error!(room_id = %room_id, user_id = %id, error = %e, "Failed to persist rating");
                }
            }
        }

        let record = MatchRecord {
            player1_id: a,
            player2_id: b,
            winner_id: outcome.winner,
            duration_seconds: outcome.duration_secs(),
            ended_at: Utc::now(),
        };
        if let Err(e) = self.store.append_match_record(record).await {
            error!(room_id = %room_id, error = %e, "Failed to persist match record");
        }

        info!(
            room_id = %room_id,
            winner = ?outcome.winner,
            old = ?(old_a, old_b),
            new = ?(new_a, new_b),
            "Match finalized"
        );

        let lobby = Arc::clone(self);
        let grace = self.config.cleanup_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            lobby.scheduler.deregister(room_id);
            lobby.rooms.lock().remove(room_id);
            debug!(room_id = %room_id, "Finished room cleaned up");
        });
    }

    async fn stored_rating(&self, user_id: Uuid) -> i32 {
        match self.store.get_identity(user_id).await {
            Ok(Some(identity)) => identity.mmr,
            Ok(None) => DEFAULT_RATING,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Rating lookup failed, using default");
                DEFAULT_RATING
            }
        }
    }

    /// Finalize match outcomes as sessions report them, one task per room
    pub async fn run(self: Arc<Self>) {
        let receiver = self.outcome_rx.lock().take();
        let Some(mut outcomes) = receiver else {
            warn!("Lobby finalizer already running");
            return;
        };
        info!("Lobby finalizer started");

        while let Some(outcome) = outcomes.recv().await {
            let lobby = self.clone();
            tokio::spawn(async move {
                lobby.finalize(outcome).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Identity, MemoryStore};
    use std::time::Duration;

    struct Harness {
        lobby: Arc<Lobby>,
        scheduler: Arc<SyncScheduler>,
        store: Arc<MemoryStore>,
        a: Participant,
        b: Participant,
        rx_a: mpsc::Receiver<ServerMsg>,
        rx_b: mpsc::Receiver<ServerMsg>,
    }

    fn participant(name: &str) -> Participant {
        Participant {
            user_id: Uuid::new_v4(),
            display_name: name.to_string(),
        }
    }

    fn harness(config: GameConfig) -> Harness {
        let hub = Arc::new(ConnectionHub::new());
        let scheduler = Arc::new(SyncScheduler::new(hub.clone()));
        let store = Arc::new(MemoryStore::new());
        let (a, b) = (participant("alice"), participant("bob"));
        store.put_identity(Identity::new(a.user_id, "alice"));
        store.put_identity(Identity::new(b.user_id, "bob"));
        let (_, rx_a) = hub.register(a.user_id);
        let (_, rx_b) = hub.register(b.user_id);
        let lobby = Arc::new(Lobby::new(scheduler.clone(), hub, store.clone(), config));
        Harness {
            lobby,
            scheduler,
            store,
            a,
            b,
            rx_a,
            rx_b,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Queue both players and return the room id
    async fn matched(h: &mut Harness) -> Uuid {
        h.lobby.handle_message(&h.a, ClientMsg::FindMatch).await;
        h.lobby.handle_message(&h.b, ClientMsg::FindMatch).await;
        let msgs = drain(&mut h.rx_a);
        drain(&mut h.rx_b);
        match msgs.last() {
            Some(ServerMsg::Matched { room_id, .. }) => *room_id,
            other => panic!("expected matched, got {other:?}"),
        }
    }

    async fn started(h: &mut Harness) -> Uuid {
        let room_id = matched(h).await;
        h.lobby
            .handle_message(&h.a, ClientMsg::Ready { room_id, char_id: None })
            .await;
        h.lobby
            .handle_message(&h.b, ClientMsg::Ready { room_id, char_id: None })
            .await;
        drain(&mut h.rx_a);
        drain(&mut h.rx_b);
        room_id
    }

    #[tokio::test]
    async fn find_match_pairs_players() {
        let mut h = harness(GameConfig::default());
        h.lobby.handle_message(&h.a, ClientMsg::FindMatch).await;
        assert!(matches!(drain(&mut h.rx_a)[..], [ServerMsg::Waiting]));
        assert_eq!(h.lobby.queue_size().await, 1);

        h.lobby.handle_message(&h.b, ClientMsg::FindMatch).await;
        assert_eq!(h.lobby.queue_size().await, 0);

        let for_a = drain(&mut h.rx_a);
        let for_b = drain(&mut h.rx_b);
        let (ServerMsg::Matched { room_id: ra, players }, ServerMsg::Matched { room_id: rb, .. }) =
            (&for_a[0], &for_b[0])
        else {
            panic!("expected matched messages");
        };
        assert_eq!(ra, rb);
        assert_eq!(players[0].user_id, h.a.user_id, "earlier arrival runs first");
        assert_eq!(h.lobby.room_count(), 1);
    }

    #[tokio::test]
    async fn cancel_leaves_queue() {
        let mut h = harness(GameConfig::default());
        h.lobby.handle_message(&h.a, ClientMsg::FindMatch).await;
        h.lobby.handle_message(&h.a, ClientMsg::CancelMatch).await;
        h.lobby.handle_message(&h.a, ClientMsg::CancelMatch).await;
        assert_eq!(h.lobby.queue_size().await, 0);
        let msgs = drain(&mut h.rx_a);
        assert!(matches!(msgs.last(), Some(ServerMsg::MatchCancelled)));
    }

    #[tokio::test]
    async fn both_ready_starts_the_match() {
        let mut h = harness(GameConfig::default());
        let room_id = matched(&mut h).await;

        h.lobby
            .handle_message(&h.a, ClientMsg::Ready { room_id, char_id: Some("doux".into()) })
            .await;
        h.lobby
            .handle_message(&h.b, ClientMsg::Ready { room_id, char_id: Some("doux".into()) })
            .await;
        let rejected = drain(&mut h.rx_b);
        assert!(rejected
            .iter()
            .any(|m| matches!(m, ServerMsg::CharSelectRejected { char_id, .. } if char_id == "doux")));
        assert!(h.scheduler.get(room_id).is_none());

        h.lobby
            .handle_message(&h.b, ClientMsg::Ready { room_id, char_id: None })
            .await;
        let msgs = drain(&mut h.rx_b);
        assert!(matches!(
            msgs[0],
            ServerMsg::ReadyUpdate {
                ready_count: 2,
                total: 2
            }
        ));
        let ServerMsg::MatchStart {
            round,
            roles,
            characters,
        } = &msgs[1]
        else {
            panic!("expected match start, got {msgs:?}");
        };
        assert_eq!(*round, 1);
        assert_eq!(roles[0].role, Role::Runner);
        assert_eq!(roles[0].player_id, h.a.user_id);
        assert_eq!(characters[0].char_id, "doux");
        assert_eq!(characters[1].char_id, "mort");

        let slot = h.scheduler.get(room_id).expect("session registered");
        assert!(slot.lock().session.is_playing());
    }

    #[tokio::test]
    async fn rejected_input_goes_to_sender_only() {
        let mut h = harness(GameConfig::default());
        let room_id = started(&mut h).await;

        let fire = ClientMsg::PlayerInput {
            room_id,
            input: PlayerAction::FireBullet,
        };
        h.lobby.handle_message(&h.b, fire.clone()).await;
        h.lobby.handle_message(&h.b, fire).await;

        let to_runner = drain(&mut h.rx_a);
        assert_eq!(to_runner.len(), 1);
        assert!(matches!(
            to_runner[0],
            ServerMsg::OpponentInput {
                input: PlayerAction::FireBullet,
                ..
            }
        ));

        let to_attacker = drain(&mut h.rx_b);
        assert!(matches!(
            &to_attacker[..],
            [ServerMsg::Error { code, .. }] if code == "cooldown_active"
        ));
    }

    #[tokio::test]
    async fn input_without_session_is_a_lifecycle_error() {
        let mut h = harness(GameConfig::default());
        h.lobby
            .handle_message(
                &h.a,
                ClientMsg::PlayerInput {
                    room_id: Uuid::new_v4(),
                    input: PlayerAction::Jump,
                },
            )
            .await;
        assert!(matches!(
            &drain(&mut h.rx_a)[..],
            [ServerMsg::Error { code, .. }] if code == "no_session"
        ));
    }

    #[tokio::test]
    async fn untrusted_collision_reports_are_ignored() {
        let config = GameConfig {
            trust_client_collision: false,
            ..GameConfig::default()
        };
        let mut h = harness(config);
        let room_id = started(&mut h).await;
        h.lobby
            .handle_message(&h.a, ClientMsg::ReportCollision { room_id })
            .await;
        let slot = h.scheduler.get(room_id).expect("session");
        assert_eq!(slot.lock().session.round, 1);
    }

    #[tokio::test]
    async fn disconnect_notifies_opponent() {
        let mut h = harness(GameConfig::default());
        let room_id = started(&mut h).await;

        h.lobby.disconnect(h.a.user_id).await;
        assert!(matches!(
            &drain(&mut h.rx_b)[..],
            [ServerMsg::OpponentLeft { player_id }] if *player_id == h.a.user_id
        ));
        // the session keeps running for the remaining player
        assert!(h.scheduler.get(room_id).is_some());

        h.lobby.disconnect(h.b.user_id).await;
        assert!(h.scheduler.get(room_id).is_none());
        assert_eq!(h.lobby.room_count(), 0);
    }

    #[tokio::test]
    async fn finished_match_updates_ratings_and_history() {
        let config = GameConfig {
            cleanup_grace: Duration::from_millis(20),
            ..GameConfig::default()
        };
        let mut h = harness(config);
        tokio::spawn(h.lobby.clone().run());
        let room_id = started(&mut h).await;

        {
            let slot = h.scheduler.get(room_id).expect("session");
            let mut slot = slot.lock();
            slot.session.players[0].score = 250;
            slot.session.report_collision(h.a.user_id);
            slot.session.players[0].score = 40;
            slot.session.report_collision(h.b.user_id);
            assert!(slot.session.is_game_over());
        }

        let mut records = Vec::new();
        for _ in 0..100 {
            records = h.store.match_records();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].winner_id, Some(h.a.user_id));
        assert_eq!(records[0].player1_id, h.a.user_id);
        assert_eq!(records[0].duration_seconds, 0);

        assert_eq!(h.store.identity(h.a.user_id).unwrap().mmr, 1016);
        assert_eq!(h.store.identity(h.b.user_id).unwrap().mmr, 984);

        let msgs = drain(&mut h.rx_b);
        let ratings = msgs
            .iter()
            .find_map(|m| match m {
                ServerMsg::RatingUpdate { ratings } => Some(ratings.clone()),
                _ => None,
            })
            .expect("rating update broadcast");
        assert_eq!(ratings[1].player_id, h.b.user_id);
        assert_eq!(ratings[1].new_rating, 984);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.scheduler.get(room_id).is_none());
        assert_eq!(h.lobby.room_count(), 0);
    }

    #[tokio::test]
    async fn ready_after_game_over_does_not_restart() {
        let mut h = harness(GameConfig::default());
        tokio::spawn(h.lobby.clone().run());
        let room_id = started(&mut h).await;

        {
            let slot = h.scheduler.get(room_id).expect("session");
            let mut slot = slot.lock();
            slot.session.report_collision(h.a.user_id);
            slot.session.report_collision(h.b.user_id);
            assert!(slot.session.is_game_over());
        }
        for _ in 0..100 {
            if h.store.match_records().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            h.lobby.rooms.lock().get(room_id).map(|r| r.status),
            Some(RoomStatus::Finished)
        );
        drain(&mut h.rx_a);

        h.lobby
            .handle_message(&h.a, ClientMsg::Ready { room_id, char_id: None })
            .await;

        let msgs = drain(&mut h.rx_a);
        assert!(matches!(
            &msgs[..],
            [ServerMsg::Error { code, .. }] if code == "room_not_waiting"
        ));
        assert_eq!(
            h.lobby.rooms.lock().get(room_id).map(|r| r.status),
            Some(RoomStatus::Finished)
        );
        let slot = h.scheduler.get(room_id).expect("finished session kept");
        assert!(slot.lock().session.is_game_over());
    }

    #[tokio::test]
    async fn banned_players_cannot_queue() {
        let mut h = harness(GameConfig::default());
        h.store
            .set_banned(h.a.user_id, "boosting".into())
            .await
            .unwrap();
        h.lobby.handle_message(&h.a, ClientMsg::FindMatch).await;
        assert!(matches!(
            &drain(&mut h.rx_a)[..],
            [ServerMsg::Error { code, message }] if code == "banned" && message == "boosting"
        ));
        assert_eq!(h.lobby.queue_size().await, 0);
    }
}
