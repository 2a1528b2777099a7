//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// A full snapshot goes out every this many ticks, deltas in between
pub const FULL_SNAPSHOT_INTERVAL: u64 = SIMULATION_TPS as u64;

/// Length of one nominal simulation frame in milliseconds.
/// Per-frame tuning constants are scaled by `elapsed / FRAME_MS`.
pub const FRAME_MS: f32 = 1000.0 / SIMULATION_TPS as f32;

/// Milliseconds elapsed between two timestamps, never negative
pub fn elapsed_ms(since: u64, now: u64) -> f32 {
    now.saturating_sub(since) as f32
}
