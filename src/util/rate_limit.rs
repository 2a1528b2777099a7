//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Inbound message limit per connection. Inputs arrive per key press, not per
/// frame, so this sits above the tick rate only to absorb bursts.
pub const INPUT_RATE_LIMIT: u32 = 120;

/// Lobby requests (find_match, create_room, ...) per connection
pub const LOBBY_RATE_LIMIT: u32 = 5;

/// Per-player rate limiter state
#[derive(Clone)]
pub struct PlayerRateLimiter {
    input_limiter: Arc<Limiter>,
    lobby_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
            lobby_limiter: create_limiter(LOBBY_RATE_LIMIT),
        }
    }

    /// Check if an in-game message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    /// Check if a lobby request is allowed
    pub fn check_lobby(&self) -> bool {
        self.lobby_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_limiter_rejects_burst() {
        let limiter = PlayerRateLimiter::new();
        let allowed = (0..20).filter(|_| limiter.check_lobby()).count();
        assert_eq!(allowed, LOBBY_RATE_LIMIT as usize);
    }
}
