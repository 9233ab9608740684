use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("LANGUR_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
}

pub fn database_url() -> Option<String> {
    env::var("DATABASE_URL").ok()
}

pub fn betting_window() -> Duration {
    let secs = env::var("BETTING_WINDOW_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}

pub const COMMAND_CHANNEL_CAPACITY: usize = 64;
pub const EVENTS_BROADCAST_CAPACITY: usize = 128;

// Upper bound for a single confirmed deposit (10,000.00 in cents).
pub const MAX_DEPOSIT_CENTS: i64 = 1_000_000;
