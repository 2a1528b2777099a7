//! Matchmaking: the rating queue, private rooms and the lobby that ties them
//! to running sessions

pub mod queue;
pub mod rooms;
pub mod service;

pub use service::{Lobby, Participant};
