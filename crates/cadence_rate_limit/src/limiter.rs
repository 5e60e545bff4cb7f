//! Per-handler rate limiter: route buckets plus the global block.

use crate::{BucketSlot, Clock, GlobalBlock, LatencyReference, SequentialBucket, SharedLatency};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, instrument};

/// Token limit a bucket starts with before the server reports one.
pub const DEFAULT_BUCKET_LIMIT: i64 = 1;

/// Owns every bucket, the shared latency reference and the global block of one
/// request handler.
///
/// Buckets are created lazily per route and live as long as the limiter; the
/// set of Discord routes a client touches is small and fixed.
#[derive(Debug)]
pub struct RouteRateLimiter {
    clock: Clock,
    latency: SharedLatency,
    global: Arc<GlobalBlock>,
    buckets: Mutex<HashMap<String, Arc<SequentialBucket>>>,
}

impl RouteRateLimiter {
    /// Create a limiter around a latency reference.
    pub fn new(reference: LatencyReference) -> Self {
        Self {
            clock: Clock::new(),
            latency: SharedLatency::new(reference),
            global: GlobalBlock::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Clock shared with every bucket.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Latency reference shared with every bucket.
    pub fn latency(&self) -> &SharedLatency {
        &self.latency
    }

    /// Global block shared by every route.
    pub fn global(&self) -> &Arc<GlobalBlock> {
        &self.global
    }

    /// Get the bucket for `route`, creating it if needed.
    pub fn bucket(&self, route: &str) -> Arc<SequentialBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(route) {
            return Arc::clone(bucket);
        }
        debug!(route, "Creating bucket");
        let bucket = SequentialBucket::new(DEFAULT_BUCKET_LIMIT, self.latency.clone(), self.clock);
        buckets.insert(route.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Existing bucket for `route`, if it has been used.
    pub fn get(&self, route: &str) -> Option<Arc<SequentialBucket>> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route)
            .cloned()
    }

    /// Wait for a slot on `bucket`.
    ///
    /// Authenticated requests issued while the global block is up are parked in
    /// the ready queue and reach their bucket only once the block lifts.
    #[instrument(skip(self, bucket))]
    pub async fn admit(
        &self,
        bucket: &Arc<SequentialBucket>,
        priority: bool,
        authenticated: bool,
    ) -> Result<BucketSlot, oneshot::error::RecvError> {
        self.enqueue(bucket, priority, authenticated).await
    }

    /// Queue an admission on `bucket` and return the receiver for its slot.
    pub fn enqueue(
        &self,
        bucket: &Arc<SequentialBucket>,
        priority: bool,
        authenticated: bool,
    ) -> oneshot::Receiver<BucketSlot> {
        let (admission, slot) = oneshot::channel();
        if authenticated {
            let bucket = Arc::clone(bucket);
            self.global
                .defer_or_run(Box::new(move || bucket.queue(admission, priority)));
        } else {
            bucket.queue(admission, priority);
        }
        slot
    }

    /// Trade a running slot for a priority admission on the same bucket.
    ///
    /// The admission is queued before `slot` is released, so the bucket serves
    /// it ahead of everything that queued while the slot was out.
    pub fn readmit(
        &self,
        slot: BucketSlot,
        bucket: &Arc<SequentialBucket>,
        authenticated: bool,
    ) -> oneshot::Receiver<BucketSlot> {
        let next = self.enqueue(bucket, true, authenticated);
        drop(slot);
        next
    }
}

impl Default for RouteRateLimiter {
    fn default() -> Self {
        Self::new(LatencyReference::default())
    }
}
