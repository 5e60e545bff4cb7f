//! Global rate-limit block.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Deferred work parked while the global block is up.
pub type Deferred = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct GlobalState {
    blocked: bool,
    ready: VecDeque<Deferred>,
}

/// Process-wide hold on authenticated requests after a global 429.
///
/// While blocked, deferred work accumulates in a ready queue. When the block
/// timer fires, the queue is flushed in FIFO order.
#[derive(Default)]
pub struct GlobalBlock {
    state: Mutex<GlobalState>,
}

impl std::fmt::Debug for GlobalBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("GlobalBlock")
            .field("blocked", &state.blocked)
            .field("ready", &state.ready.len())
            .finish()
    }
}

impl GlobalBlock {
    /// Create an unblocked instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether the block is currently up.
    pub fn is_blocked(&self) -> bool {
        self.lock().blocked
    }

    /// Number of deferred entries waiting for release.
    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    /// Run `work` now, or park it until the block lifts.
    pub fn defer_or_run(&self, work: Deferred) {
        {
            let mut state = self.lock();
            if state.blocked {
                state.ready.push_back(work);
                debug!(pending = state.ready.len(), "Deferred request behind global rate limit");
                return;
            }
        }
        work();
    }

    /// Raise the block and schedule its release after `delay_ms`.
    pub fn block_for(self: &Arc<Self>, delay_ms: i64) {
        self.lock().blocked = true;
        warn!(delay_ms, "Global rate limit hit, holding authenticated requests");
        let block = Arc::clone(self);
        let delay = Duration::from_millis(delay_ms.max(1) as u64);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            block.unblock();
        });
    }

    /// Lift the block and flush the ready queue in order.
    pub fn unblock(&self) {
        let ready = {
            let mut state = self.lock();
            state.blocked = false;
            std::mem::take(&mut state.ready)
        };
        debug!(flushed = ready.len(), "Global rate limit lifted");
        for work in ready {
            work();
        }
    }

    fn lock(&self) -> MutexGuard<'_, GlobalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
