use std::time::Duration;

/// Source of wall-clock time in epoch seconds
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Milliseconds to a duration, negative values clamped to zero
pub fn clamped_millis(ms: i128) -> Duration {
    Duration::from_millis(u64::try_from(ms.max(0)).unwrap_or(u64::MAX))
}
