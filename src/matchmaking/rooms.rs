//! Room records: membership, character picks and readiness

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{PlayerInfo, RoomInfo, RoomSummary};

pub const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Ready,
    Playing,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant, with the rating captured when they entered the room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMember {
    pub user_id: Uuid,
    pub display_name: String,
    pub rating: i32,
}

impl RoomMember {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            rating: self.rating,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: Uuid,
    pub host: String,
    /// Join order; the first player runs first
    pub players: Vec<RoomMember>,
    pub status: RoomStatus,
    pub characters: HashMap<Uuid, String>,
    pub ready: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    fn new(host: RoomMember) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.display_name.clone(),
            players: vec![host],
            status: RoomStatus::Waiting,
            characters: HashMap::new(),
            ready: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }

    pub fn member(&self, user_id: Uuid) -> Option<&RoomMember> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| p.user_id).collect()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= ROOM_CAPACITY
    }

    /// Still in the lobby phase: characters and readiness can change
    pub fn is_open(&self) -> bool {
        matches!(self.status, RoomStatus::Waiting | RoomStatus::Ready)
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            status: self.status.to_string(),
            players: self.players.iter().map(RoomMember::info).collect(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            host: self.host.clone(),
            player_count: self.players.len(),
        }
    }
}

/// What `leave` left behind
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    /// Players still in the room
    pub remaining: Vec<Uuid>,
    /// The room was empty and has been removed
    pub room_deleted: bool,
}

/// All rooms plus a reverse index from player to room
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<Uuid, Room>,
    player_rooms: HashMap<Uuid, Uuid>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, room_id: Uuid) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Room the player currently sits in
    pub fn room_of(&self, user_id: Uuid) -> Option<Uuid> {
        self.player_rooms.get(&user_id).copied()
    }

    fn room_mut(&mut self, room_id: Uuid) -> Result<&mut Room, RoomError> {
        self.rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound)
    }

    fn ensure_free(&self, user_id: Uuid) -> Result<(), RoomError> {
        match self.player_rooms.get(&user_id) {
            Some(_) => Err(RoomError::AlreadyInRoom),
            None => Ok(()),
        }
    }

    fn insert(&mut self, room: Room) -> &Room {
        let id = room.id;
        for player in &room.players {
            self.player_rooms.insert(player.user_id, id);
        }
        self.rooms.entry(id).or_insert(room)
    }

    /// Open a new room with `host` waiting inside
    pub fn create_room(&mut self, host: RoomMember) -> Result<&Room, RoomError> {
        self.ensure_free(host.user_id)?;
        let room = Room::new(host);
        info!(room_id = %room.id, host = %room.host, "Room created");
        Ok(self.insert(room))
    }

    /// Room for a queue pairing; `first` runs first
    pub fn create_matched(
        &mut self,
        first: RoomMember,
        second: RoomMember,
    ) -> Result<&Room, RoomError> {
        self.ensure_free(first.user_id)?;
        self.ensure_free(second.user_id)?;
        let mut room = Room::new(first);
        room.players.push(second);
        room.status = RoomStatus::Ready;
        info!(room_id = %room.id, "Room created for queue match");
        Ok(self.insert(room))
    }

    pub fn join(&mut self, room_id: Uuid, member: RoomMember) -> Result<&Room, RoomError> {
        let user_id = member.user_id;
        match self.room_of(user_id) {
            Some(current) if current == room_id => return self.room_mut(room_id).map(|r| &*r),
            Some(_) => return Err(RoomError::AlreadyInRoom),
            None => {}
        }

        let room = self.room_mut(room_id)?;
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::RoomNotWaiting);
        }
        room.players.push(member);
        if room.is_full() {
            room.status = RoomStatus::Ready;
        }
        debug!(room_id = %room_id, user_id = %user_id, "Player joined room");

        self.player_rooms.insert(user_id, room_id);
        self.room_mut(room_id).map(|r| &*r)
    }

    /// Claim a character. Re-picking one's own is fine; taking the other
    /// player's is not.
    pub fn select_character(
        &mut self,
        room_id: Uuid,
        user_id: Uuid,
        char_id: &str,
    ) -> Result<(), RoomError> {
        let room = self.room_mut(room_id)?;
        if !room.contains(user_id) {
            return Err(RoomError::NotInRoom);
        }
        if !room.is_open() {
            return Err(RoomError::RoomNotWaiting);
        }
        let taken = room
            .characters
            .iter()
            .any(|(owner, picked)| *owner != user_id && picked == char_id);
        if taken {
            return Err(RoomError::CharacterTaken);
        }
        room.characters.insert(user_id, char_id.to_string());
        Ok(())
    }

    /// Mark a member ready. Returns `(ready_count, total_players)`.
    pub fn mark_ready(&mut self, room_id: Uuid, user_id: Uuid) -> Result<(usize, usize), RoomError> {
        let room = self.room_mut(room_id)?;
        if !room.contains(user_id) {
            return Err(RoomError::NotInRoom);
        }
        if !room.is_open() {
            return Err(RoomError::RoomNotWaiting);
        }
        if !room.ready.contains(&user_id) {
            room.ready.push(user_id);
        }
        Ok((room.ready.len(), room.players.len()))
    }

    pub fn set_status(&mut self, room_id: Uuid, status: RoomStatus) -> bool {
        match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a member. The room goes away with its last member.
    pub fn leave(&mut self, room_id: Uuid, user_id: Uuid) -> Result<Departure, RoomError> {
        let room = self.room_mut(room_id)?;
        if !room.contains(user_id) {
            return Err(RoomError::NotInRoom);
        }

        room.players.retain(|p| p.user_id != user_id);
        room.ready.retain(|id| *id != user_id);
        room.characters.remove(&user_id);
        if room.status == RoomStatus::Ready {
            room.status = RoomStatus::Waiting;
        }
        if let Some(next_host) = room.players.first() {
            room.host = next_host.display_name.clone();
        }
        let remaining = room.member_ids();

        self.player_rooms.remove(&user_id);
        let room_deleted = remaining.is_empty();
        if room_deleted {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "Room deleted (empty)");
        }

        Ok(Departure {
            remaining,
            room_deleted,
        })
    }

    /// Drop a room outright, releasing its members
    pub fn remove(&mut self, room_id: Uuid) -> Option<Room> {
        let room = self.rooms.remove(&room_id)?;
        for player in &room.players {
            if self.player_rooms.get(&player.user_id) == Some(&room_id) {
                self.player_rooms.remove(&player.user_id);
            }
        }
        Some(room)
    }

    /// Rooms someone can still join, oldest first
    pub fn list_open(&self) -> Vec<RoomSummary> {
        let mut open: Vec<&Room> = self
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting && !r.is_full())
            .collect();
        open.sort_by_key(|r| r.created_at);
        open.into_iter().map(Room::summary).collect()
    }
}

/// Room lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game already started")]
    RoomNotWaiting,

    #[error("Not a member of this room")]
    NotInRoom,

    #[error("Character already taken")]
    CharacterTaken,

    #[error("Already in a room")]
    AlreadyInRoom,
}

impl RoomError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "room_not_found",
            Self::RoomFull => "room_full",
            Self::RoomNotWaiting => "room_not_waiting",
            Self::NotInRoom => "not_in_room",
            Self::CharacterTaken => "character_taken",
            Self::AlreadyInRoom => "already_in_room",
        }
    }
}
