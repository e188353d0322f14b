//! Host clock.

use codebase_index_ports::ClockPort;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall clock plus a monotonic clock that follows tokio's (pausable) time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose monotonic origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now_epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
            .unwrap_or_default()
    }

    fn monotonic_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn monotonic_time_follows_paused_runtime() {
        let clock = SystemClock::new();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.monotonic_ms(), 1_500);
        assert!(clock.now_epoch_ms() > 1_600_000_000_000);
    }
}
