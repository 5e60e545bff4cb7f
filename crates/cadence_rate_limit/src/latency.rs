//! Round-trip latency and clock-offset tracking.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Number of samples kept in each rolling window.
pub const SAMPLE_WINDOW: usize = 10;

/// Latency assumed before any response has been observed.
pub const INITIAL_LATENCY_MS: i64 = 500;

/// Minimum spacing between two clock-offset samples.
pub const CLOCK_CHECK_INTERVAL_MS: i64 = 5_000;

/// Rolling record of request latency and local clock offset.
///
/// Both averages are maintained incrementally: each new sample replaces the
/// oldest one and shifts the average by a tenth of the difference. Buckets read
/// the average latency to add scheduling slack; the request handler reads the
/// clock offset to translate server reset timestamps into local time.
#[derive(Debug, Clone)]
pub struct LatencyReference {
    latency: i64,
    offset: i64,
    raw: VecDeque<i64>,
    time_offset: i64,
    time_offsets: VecDeque<i64>,
    last_time_offset_check: i64,
    compensate: bool,
}

impl LatencyReference {
    /// Create a reference with a fixed scheduling offset.
    ///
    /// With `compensate` disabled the measured latency and clock offset are
    /// still recorded, but neither is applied to scheduling decisions.
    pub fn new(offset: i64, compensate: bool) -> Self {
        Self {
            latency: INITIAL_LATENCY_MS,
            offset,
            raw: VecDeque::from(vec![INITIAL_LATENCY_MS; SAMPLE_WINDOW]),
            time_offset: 0,
            time_offsets: VecDeque::from(vec![0; SAMPLE_WINDOW]),
            last_time_offset_check: 0,
            compensate,
        }
    }

    /// Average round-trip latency in milliseconds.
    pub fn latency(&self) -> i64 {
        self.latency
    }

    /// Fixed scheduling offset in milliseconds.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Average amount the local clock runs ahead of the server, in milliseconds.
    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }

    /// Slack a bucket waits past a window boundary before dispatching again.
    pub fn scheduling_slack(&self) -> i64 {
        if self.compensate {
            self.latency + self.offset
        } else {
            self.offset
        }
    }

    /// Clock offset to subtract from server-issued reset timestamps.
    pub fn reset_correction(&self) -> i64 {
        if self.compensate { self.time_offset } else { 0 }
    }

    /// Fold one latency sample into the rolling average and return the new average.
    pub fn record_latency(&mut self, sample: i64) -> i64 {
        self.raw.push_back(sample);
        let evicted = self.raw.pop_front().unwrap_or(INITIAL_LATENCY_MS);
        self.latency = self.latency - evicted / 10 + sample / 10;
        self.latency
    }

    /// Sample the local clock against the server's `date` header.
    ///
    /// Samples are taken at most once per [`CLOCK_CHECK_INTERVAL_MS`]. Returns
    /// the offset worth warning about when both the running average and the
    /// fresh sample exceed `threshold` after discounting latency.
    pub fn sample_clock(&mut self, now: i64, server_now: i64, threshold: i64) -> Option<i64> {
        if self.last_time_offset_check >= now - CLOCK_CHECK_INTERVAL_MS {
            return None;
        }
        self.last_time_offset_check = now;
        let sample = now - server_now;

        let skewed = self.time_offset - self.latency >= threshold
            && sample - self.latency >= threshold;
        let reported = skewed.then_some(self.time_offset);

        let evicted = self.time_offsets.pop_front().unwrap_or_default();
        self.time_offset =
            (self.time_offset as f64 - evicted as f64 / 10.0 + sample as f64 / 10.0).trunc() as i64;
        self.time_offsets.push_back(sample);
        debug!(sample, time_offset = self.time_offset, "Sampled clock offset");

        reported
    }
}

impl Default for LatencyReference {
    fn default() -> Self {
        Self::new(0, true)
    }
}

/// Cloneable handle to a [`LatencyReference`] shared by a handler and its buckets.
///
/// Critical sections are short and never cross an `.await`, so a plain mutex is
/// used; buckets read it from synchronous scheduling code.
#[derive(Debug, Clone, Default)]
pub struct SharedLatency(Arc<Mutex<LatencyReference>>);

impl SharedLatency {
    /// Wrap a latency reference for sharing.
    pub fn new(reference: LatencyReference) -> Self {
        Self(Arc::new(Mutex::new(reference)))
    }

    /// Lock the reference for reading or updating.
    pub fn lock(&self) -> MutexGuard<'_, LatencyReference> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current scheduling slack in milliseconds.
    pub fn scheduling_slack(&self) -> i64 {
        self.lock().scheduling_slack()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> LatencyReference {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let reference = LatencyReference::new(25, true);
        assert_eq!(reference.latency(), 500);
        assert_eq!(reference.time_offset(), 0);
        assert_eq!(reference.scheduling_slack(), 525);
    }

    #[test]
    fn test_latency_moving_average() {
        let mut reference = LatencyReference::default();
        assert_eq!(reference.record_latency(100), 460);
        assert_eq!(reference.record_latency(100), 420);
        for _ in 0..8 {
            reference.record_latency(100);
        }
        assert_eq!(reference.latency(), 100);
        // The window is full of 100ms samples now; a slow one moves it by a tenth
        assert_eq!(reference.record_latency(1_100), 200);
    }

    #[test]
    fn test_clock_sampled_at_most_every_five_seconds() {
        let mut reference = LatencyReference::default();
        let now = 1_700_000_000_000;
        reference.sample_clock(now, now - 1_000, 30_000);
        assert_eq!(reference.time_offset(), 100);

        // Within the interval: ignored
        reference.sample_clock(now + 4_000, now - 100_000, 30_000);
        assert_eq!(reference.time_offset(), 100);

        reference.sample_clock(now + 5_001, now + 5_001 - 1_000, 30_000);
        assert_eq!(reference.time_offset(), 200);
    }

    #[test]
    fn test_clock_skew_reported_after_sustained_offset() {
        let mut reference = LatencyReference::default();
        let mut now = 1_700_000_000_000;
        let mut warnings = Vec::new();
        for _ in 0..12 {
            now += 6_000;
            if let Some(offset) = reference.sample_clock(now, now - 60_000, 30_000) {
                warnings.push(offset);
            }
        }
        // The average has to climb past threshold + latency before warnings start
        assert!(!warnings.is_empty());
        assert!(warnings.iter().all(|offset| *offset - 500 >= 30_000));
    }

    #[test]
    fn test_disabled_compensation_uses_offset_only() {
        let mut reference = LatencyReference::new(40, false);
        reference.sample_clock(10_000, 9_000, 30_000);
        assert_eq!(reference.scheduling_slack(), 40);
        assert_eq!(reference.reset_correction(), 0);
        assert_eq!(reference.time_offset(), 100);
    }
}
