//! Tests for sequential bucket admission.

use cadence_rate_limit::{Clock, LatencyReference, SequentialBucket, SharedLatency};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

fn create_bucket(limit: i64, offset: i64) -> (Arc<SequentialBucket>, Clock) {
    let clock = Clock::new();
    let latency = SharedLatency::new(LatencyReference::new(offset, false));
    (SequentialBucket::new(limit, latency, clock), clock)
}

#[tokio::test(start_paused = true)]
async fn test_limit_one_admits_in_fifo_order() {
    let (bucket, _) = create_bucket(1, 0);

    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, mut rx_b) = oneshot::channel();
    let (tx_c, mut rx_c) = oneshot::channel();
    bucket.queue(tx_a, false);
    bucket.queue(tx_b, false);
    bucket.queue(tx_c, false);

    let slot_a = rx_a.await.expect("first admission");
    assert!(rx_b.try_recv().is_err(), "second admitted while first running");
    assert_eq!(bucket.snapshot().queued(), &2);

    drop(slot_a);
    let slot_b = (&mut rx_b).await.expect("second admission");
    assert!(rx_c.try_recv().is_err(), "third admitted while second running");

    drop(slot_b);
    let slot_c = (&mut rx_c).await.expect("third admission");
    drop(slot_c);

    tokio::task::yield_now().await;
    let snapshot = bucket.snapshot();
    assert_eq!(snapshot.queued(), &0);
    assert!(!snapshot.busy());
}

#[tokio::test(start_paused = true)]
async fn test_priority_admission_jumps_queue_but_not_running_slot() {
    let (bucket, _) = create_bucket(1, 0);

    let running = bucket.acquire(false).await.expect("running admission");

    let (tx_b, mut rx_b) = oneshot::channel();
    let (tx_c, mut rx_c) = oneshot::channel();
    let (tx_retry, mut rx_retry) = oneshot::channel();
    bucket.queue(tx_b, false);
    bucket.queue(tx_c, false);
    bucket.queue(tx_retry, true);

    // The running slot is never preempted
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx_retry.try_recv().is_err());

    drop(running);
    let retry = (&mut rx_retry).await.expect("retry admission");
    assert!(rx_b.try_recv().is_err());

    drop(retry);
    let b = (&mut rx_b).await.expect("b admission");
    assert!(rx_c.try_recv().is_err());
    drop(b);
    let c = (&mut rx_c).await.expect("c admission");
    drop(c);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_bucket_waits_for_reset_plus_slack() {
    let (bucket, clock) = create_bucket(1, 50);

    let first = bucket.acquire(false).await.expect("first admission");
    let reset = clock.now_ms() + 1_000;
    bucket.update(|limits| {
        limits.remaining = 0;
        limits.reset = reset;
    });

    let (tx, rx) = oneshot::channel();
    bucket.queue(tx, false);
    let started = Instant::now();
    drop(first);

    let second = rx.await.expect("second admission");
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_millis(1_050),
        "admitted after only {:?}",
        waited
    );
    assert!(clock.now_ms() >= reset + 50);
    drop(second);
}

#[tokio::test(start_paused = true)]
async fn test_window_refill_restores_limit() {
    let (bucket, _) = create_bucket(3, 0);

    let slot = bucket.acquire(false).await.expect("admission");
    assert_eq!(bucket.limits().remaining, 2);
    drop(slot);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let slot = bucket.acquire(false).await.expect("admission after window");
    // The window rolled over, so the count restarts from the limit
    assert_eq!(bucket.limits().remaining, 2);
    drop(slot);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_admission_is_skipped() {
    let (bucket, _) = create_bucket(1, 0);

    let running = bucket.acquire(false).await.expect("running admission");
    let (tx_gone, rx_gone) = oneshot::channel();
    let (tx_next, rx_next) = oneshot::channel();
    bucket.queue(tx_gone, false);
    bucket.queue(tx_next, false);
    drop(rx_gone);

    drop(running);
    let next = tokio::time::timeout(Duration::from_secs(5), rx_next)
        .await
        .expect("next admission not delayed by abandoned one")
        .expect("next admission");
    drop(next);
}

#[tokio::test(start_paused = true)]
async fn test_slot_released_on_panic() {
    let (bucket, _) = create_bucket(1, 0);

    let task_bucket = Arc::clone(&bucket);
    let handle = tokio::spawn(async move {
        let _slot = task_bucket.acquire(false).await.expect("admission");
        panic!("request handler blew up");
    });
    assert!(handle.await.is_err());

    let slot = tokio::time::timeout(Duration::from_secs(5), bucket.acquire(false))
        .await
        .expect("bucket freed after panic")
        .expect("admission");
    drop(slot);
}

#[tokio::test(start_paused = true)]
async fn test_far_future_reset_holds_queue_without_overflow() {
    let (bucket, _) = create_bucket(1, 50);

    let first = bucket.acquire(false).await.expect("first admission");
    bucket.update(|limits| {
        limits.remaining = 0;
        limits.reset = i64::MAX;
        limits.reset_interval = i64::MAX;
    });

    let (tx, mut rx) = oneshot::channel();
    bucket.queue(tx, false);
    drop(first);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err(), "admitted before a far-future reset");
    let snapshot = bucket.snapshot();
    assert_eq!(snapshot.queued(), &1);
    assert!(snapshot.busy());
    assert_eq!(snapshot.limits().reset, i64::MAX);
}
