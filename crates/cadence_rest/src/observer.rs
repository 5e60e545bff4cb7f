//! Diagnostic sink for the request pipeline.
//!
//! The handler reports a one-line trace for every response (`debug`) and
//! conditions an operator should look at (`warn`): clock skew and buckets that
//! stopped receiving rate-limit headers. Observers must not block.

use std::fmt;
use tracing::{debug, warn};

/// Receiver for pipeline diagnostics.
pub trait RestObserver: fmt::Debug + Send + Sync {
    /// Per-response trace line.
    fn debug(&self, message: &str);

    /// Operator-facing warning.
    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under the `cadence_rest` target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracingObserver;

impl RestObserver for TracingObserver {
    fn debug(&self, message: &str) {
        debug!(target: "cadence_rest", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "cadence_rest", "{message}");
    }
}
