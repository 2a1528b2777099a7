//! Game simulation modules

pub mod combat;
pub mod physics;
pub mod scheduler;
pub mod session;
pub mod snapshot;

pub use scheduler::SyncScheduler;
pub use session::{GameSession, InputOutcome, MatchOutcome};
