//! HTTP surface: health, room listing and the WebSocket upgrade

pub mod middleware;
pub mod routes;

pub use routes::build_router;
