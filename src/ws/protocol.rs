//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Round role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Avoids obstacles to survive the round
    Runner,
    /// Spends stamina to throw obstacles at the runner
    Attacker,
}

/// In-game actions. Which ones apply depends on the sender's current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    Jump,
    SneakStart,
    SneakEnd,
    FireBullet,
    ChargeStart,
    ChargeEnd,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the rated matchmaking queue
    FindMatch,

    /// Leave the matchmaking queue
    CancelMatch,

    /// Open a private room
    CreateRoom,

    JoinRoom {
        room_id: Uuid,
    },

    LeaveRoom {
        room_id: Uuid,
    },

    /// Request the list of joinable rooms
    ListRooms,

    SelectCharacter {
        room_id: Uuid,
        char_id: String,
    },

    /// Mark ready, optionally picking a character at the same time
    Ready {
        room_id: Uuid,
        #[serde(default)]
        char_id: Option<String>,
    },

    /// In-game action
    PlayerInput {
        room_id: Uuid,
        input: PlayerAction,
    },

    /// Client-side collision report, treated as an authoritative hit
    ReportCollision {
        room_id: Uuid,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        rating: i32,
        server_time: u64,
    },

    /// Queued, no compatible opponent yet
    Waiting,

    /// Removed from the queue
    MatchCancelled,

    /// Queue paired two players into a new room
    Matched {
        room_id: Uuid,
        players: Vec<PlayerInfo>,
    },

    /// Room membership changed (sent to every member)
    RoomJoined {
        room: RoomInfo,
    },

    RoomList {
        rooms: Vec<RoomSummary>,
    },

    CharSelected {
        player_id: Uuid,
        char_id: String,
    },

    CharSelectRejected {
        char_id: String,
        reason: String,
    },

    ReadyUpdate {
        ready_count: usize,
        total: usize,
    },

    /// Both players ready, round 1 begins
    MatchStart {
        round: u8,
        roles: Vec<PlayerRole>,
        characters: Vec<PlayerCharacter>,
    },

    /// Game state, full or delta (sent at the tick rate)
    State(StatePayload),

    /// Opponent's input, relayed for client-side animation
    OpponentInput {
        player_id: Uuid,
        input: PlayerAction,
    },

    RoundEnd {
        round: u8,
        reason: RoundEndReason,
        scores: [u32; 2],
    },

    /// Round 2 finished
    MatchOver {
        winner: Option<Uuid>,
        scores: [u32; 2],
        duration_secs: u32,
    },

    RatingUpdate {
        ratings: Vec<RatingEntry>,
    },

    OpponentLeft {
        player_id: Uuid,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEndReason {
    HitObstacle,
    TimeUp,
}

impl std::fmt::Display for RoundEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HitObstacle => f.write_str("hit obstacle"),
            Self::TimeUp => f.write_str("time up"),
        }
    }
}

/// Player info for lobby/match messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: Uuid,
    pub display_name: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: Uuid,
    pub status: String,
    pub players: Vec<PlayerInfo>,
}

/// Joinable room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub host: String,
    pub player_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRole {
    pub player_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCharacter {
    pub player_id: Uuid,
    pub char_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub player_id: Uuid,
    pub old_rating: i32,
    pub new_rating: i32,
}

/// State message body. A full snapshot has every field set; a delta carries
/// only what changed since the previous message to the same room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub full: bool,
    /// Server timestamp (ms)
    pub t: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamina: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldowns: Option<Cooldowns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p1: Option<PlayerDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p2: Option<PlayerDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obstacles: Option<Vec<ObstacleView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explosions: Option<Vec<ExplosionView>>,
}

/// Attack cooldowns remaining (ms)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cooldowns {
    pub wall: f32,
    pub bullet: f32,
}

/// Per-player fields; in a delta only changed ones are present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_jumping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sneaking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facing_right: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
}

impl PlayerDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Bullet,
    Wall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleView {
    pub id: u64,
    pub kind: ObstacleKind,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub vx: f32,
}

/// One-shot visual effect (double jump burst)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"player_input","room_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","input":{"type":"fire_bullet"}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMsg::PlayerInput {
                input: PlayerAction::FireBullet,
                ..
            }
        ));

        let ready: ClientMsg =
            serde_json::from_str(r#"{"type":"ready","room_id":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#)
                .unwrap();
        assert!(matches!(ready, ClientMsg::Ready { char_id: None, .. }));
    }

    #[test]
    fn delta_omits_unchanged_fields() {
        let payload = StatePayload {
            t: 42,
            stamina: Some(80.0),
            p2: Some(PlayerDelta {
                y: Some(45.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(ServerMsg::State(payload)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "state",
                "full": false,
                "t": 42,
                "stamina": 80.0,
                "p2": { "y": 45.5 }
            })
        );
    }
}
