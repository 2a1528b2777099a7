//! Skill rating and rating-abuse detection

pub mod abuse;
pub mod elo;

pub use abuse::AbuseMonitor;
