//! Millisecond wall clock shared by buckets and the request handler.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Epoch-millisecond clock driven by the tokio timer.
///
/// Discord reports reset times as Unix timestamps, while bucket waits are tokio
/// sleeps. Anchoring the wall clock to a [`tokio::time::Instant`] keeps both on
/// the same time base, so a bucket that sleeps until `reset` wakes up exactly
/// when [`Clock::now_ms`] reaches it (and paused-time tests stay deterministic).
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch_ms: i64,
    anchor: Instant,
}

impl Clock {
    /// Anchor a new clock at the current system time.
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default();
        Self {
            epoch_ms,
            anchor: Instant::now(),
        }
    }

    /// Current Unix time in milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as i64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = Clock::new();
        let start = clock.now_ms();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_ms() - start, 1_500);
    }
}
