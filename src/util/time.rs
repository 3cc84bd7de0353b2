//! Time utilities and game timing constants

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

/// Ticks spent counting down before the first serve (~2 s)
pub const COUNTDOWN_TICKS: u32 = 120;
/// A countdown value is broadcast every this many ticks
pub const COUNTDOWN_STEP_TICKS: u32 = 40;
/// Pause between a point and the next serve
pub const SERVE_PAUSE_TICKS: u32 = 40;

/// Pending invitations older than this can no longer be accepted
pub const INVITE_TTL: Duration = Duration::from_millis(5000);
/// How often expired invitations are physically dropped
pub const INVITE_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Duration of one simulation tick
pub fn tick_duration() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}
