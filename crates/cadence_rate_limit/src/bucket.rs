//! Sequential per-route token bucket.
//!
//! A [`SequentialBucket`] admits one request at a time, in submission order, and
//! never more than `limit` requests per reset window. Admission hands out a
//! [`BucketSlot`]; the next queued request is considered only once that slot is
//! dropped, so every exit path of a request (success, error, retry, panic,
//! cancellation) frees the bucket.

use crate::{Clock, SharedLatency};
use derive_getters::Getters;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Sender half of a queued admission.
pub type Admission = oneshot::Sender<BucketSlot>;

/// Token accounting for one bucket.
///
/// `reset` is an absolute Unix timestamp in milliseconds; `0` means the bucket
/// has not been used yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    /// Tokens per reset window
    pub limit: i64,
    /// Tokens left in the current window
    pub remaining: i64,
    /// When the current window ends
    pub reset: i64,
    /// Length added to `reset` when a window rolls over
    pub reset_interval: i64,
}

/// Point-in-time view of a bucket for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct BucketSnapshot {
    /// Token accounting
    limits: BucketLimits,
    /// Requests waiting for admission
    queued: usize,
    /// Whether a slot is out or a reset timer is armed
    busy: bool,
}

#[derive(Debug)]
struct BucketState {
    limits: BucketLimits,
    busy: bool,
    timer: Option<JoinHandle<()>>,
    queue: VecDeque<Admission>,
}

/// FIFO token bucket for a single rate-limit route.
///
/// # Example
///
/// ```rust,ignore
/// use cadence_rate_limit::{Clock, SequentialBucket, SharedLatency};
///
/// let bucket = SequentialBucket::new(1, SharedLatency::default(), Clock::new());
/// let slot = bucket.acquire(false).await?;
/// // Make the request...
/// drop(slot); // Lets the next queued request through
/// ```
#[derive(Debug)]
pub struct SequentialBucket {
    state: Mutex<BucketState>,
    latency: SharedLatency,
    clock: Clock,
}

impl SequentialBucket {
    /// Create a bucket allowing `limit` requests per window.
    pub fn new(limit: i64, latency: SharedLatency, clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BucketState {
                limits: BucketLimits {
                    limit,
                    remaining: limit,
                    reset: 0,
                    reset_interval: 0,
                },
                busy: false,
                timer: None,
                queue: VecDeque::new(),
            }),
            latency,
            clock,
        })
    }

    /// Queue an admission and wait for a slot.
    ///
    /// Priority admissions go to the front of the queue. Fails only if the
    /// admission was discarded without being served.
    pub async fn acquire(
        self: &Arc<Self>,
        priority: bool,
    ) -> Result<BucketSlot, oneshot::error::RecvError> {
        let (admission, slot) = oneshot::channel();
        self.queue(admission, priority);
        slot.await
    }

    /// Queue an admission without waiting.
    ///
    /// The slot is delivered through `admission` once the bucket lets it run. An
    /// admission whose receiver has gone away is skipped and does not consume a
    /// token.
    pub fn queue(self: &Arc<Self>, admission: Admission, priority: bool) {
        let mut state = self.lock();
        if priority {
            state.queue.push_front(admission);
        } else {
            state.queue.push_back(admission);
        }
        trace!(priority, queued = state.queue.len(), "Queued bucket admission");
        self.drain(&mut state, false);
    }

    /// Adjust token accounting, typically from rate-limit response headers.
    pub fn update<R>(&self, f: impl FnOnce(&mut BucketLimits) -> R) -> R {
        f(&mut self.lock().limits)
    }

    /// Current token accounting.
    pub fn limits(&self) -> BucketLimits {
        self.lock().limits
    }

    /// Current state for diagnostics.
    pub fn snapshot(&self) -> BucketSnapshot {
        let state = self.lock();
        BucketSnapshot {
            limits: state.limits,
            queued: state.queue.len(),
            busy: state.busy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.queue.is_empty() {
            state.busy = false;
        } else {
            self.drain(&mut state, true);
        }
    }

    fn resume(self: &Arc<Self>) {
        let mut state = self.lock();
        state.timer = None;
        self.drain(&mut state, true);
    }

    /// Admit the head of the queue if the window allows it.
    ///
    /// `resumed` is set when called from a slot release or a reset timer, which
    /// own the busy flag and may continue draining.
    fn drain(self: &Arc<Self>, state: &mut BucketState, mut resumed: bool) {
        loop {
            if state.queue.is_empty() {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.busy = false;
                return;
            }
            if state.busy && !resumed {
                return;
            }

            let now = self.clock.now_ms();
            let slack = self.latency.scheduling_slack();
            let limits = &mut state.limits;
            let floor = now.saturating_sub(slack);
            if limits.reset == 0 {
                limits.reset = floor;
                limits.remaining = limits.limit;
            } else if limits.reset <= floor {
                limits.reset = floor.saturating_add(limits.reset_interval);
                limits.remaining = limits.limit;
            }

            if limits.remaining <= 0 {
                let wait = limits.reset.saturating_sub(now).max(0).saturating_add(slack);
                debug!(wait_ms = wait, reset = limits.reset, "Bucket exhausted, waiting for reset");
                let Ok(runtime) = Handle::try_current() else {
                    // Outside a runtime; the next queue() call re-evaluates the window
                    state.busy = false;
                    return;
                };
                let bucket = Arc::clone(self);
                state.busy = true;
                state.timer = Some(runtime.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(wait.max(1) as u64)).await;
                    bucket.resume();
                }));
                return;
            }

            limits.remaining -= 1;
            state.busy = true;
            let Some(admission) = state.queue.pop_front() else {
                continue;
            };
            let slot = BucketSlot {
                bucket: Some(Arc::clone(self)),
            };
            match admission.send(slot) {
                Ok(()) => return,
                Err(mut abandoned) => {
                    // Nobody is waiting; hand the token back without re-locking on drop
                    abandoned.bucket = None;
                    state.limits.remaining += 1;
                    resumed = true;
                }
            }
        }
    }
}

/// Admission to run one request on a bucket.
///
/// Dropping the slot lets the bucket admit its next queued request.
#[derive(Debug)]
pub struct BucketSlot {
    bucket: Option<Arc<SequentialBucket>>,
}

impl Drop for BucketSlot {
    fn drop(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            bucket.release();
        }
    }
}
