//! WebSocket transport: wire protocol, per-connection routing and the socket handler

pub mod handler;
pub mod hub;
pub mod protocol;
