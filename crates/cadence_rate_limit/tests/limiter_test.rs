//! Tests for route buckets and the global block.

use cadence_rate_limit::{GlobalBlock, LatencyReference, RouteRateLimiter, routefy};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_same_route_shares_bucket() {
    let limiter = RouteRateLimiter::new(LatencyReference::new(0, false));
    let a = limiter.bucket(&routefy("/channels/111111111111111111/messages"));
    let b = limiter.bucket(&routefy("/channels/222222222222222222/messages"));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.limits().limit, 1);

    let other = limiter.bucket("/oauth2/token");
    assert!(!Arc::ptr_eq(&a, &other));
    assert!(limiter.get("/never/used").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_global_unblock_flushes_in_order() {
    let block = GlobalBlock::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    // Unblocked work runs immediately
    let seen = Arc::clone(&order);
    block.defer_or_run(Box::new(move || seen.lock().unwrap().push(0)));
    assert_eq!(*order.lock().unwrap(), vec![0]);

    // No await follows, so the release timer cannot fire before unblock()
    block.block_for(60_000);
    assert!(block.is_blocked());
    for i in 1..=3 {
        let seen = Arc::clone(&order);
        block.defer_or_run(Box::new(move || seen.lock().unwrap().push(i)));
    }
    assert_eq!(block.pending(), 3);
    assert_eq!(*order.lock().unwrap(), vec![0]);

    block.unblock();
    assert!(!block.is_blocked());
    assert_eq!(block.pending(), 0);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_requests_wait_for_global_release() {
    let limiter = Arc::new(RouteRateLimiter::new(LatencyReference::new(0, false)));
    let bucket = limiter.bucket("/users/@me");
    limiter.global().block_for(2_000);

    let authed = {
        let limiter = Arc::clone(&limiter);
        let bucket = Arc::clone(&bucket);
        tokio::spawn(async move {
            let slot = limiter.admit(&bucket, false, true).await.unwrap();
            drop(slot);
            tokio::time::Instant::now()
        })
    };
    let started = tokio::time::Instant::now();

    // Unauthenticated traffic is not held
    let open = limiter.bucket("/oauth2/token");
    let slot = tokio::time::timeout(Duration::from_millis(100), limiter.admit(&open, false, false))
        .await
        .expect("unauthenticated request held by global block")
        .unwrap();
    drop(slot);

    let admitted_at = authed.await.unwrap();
    assert!(admitted_at - started >= Duration::from_millis(2_000));
    assert!(!limiter.global().is_blocked());
}

#[tokio::test(start_paused = true)]
async fn test_readmit_runs_before_requests_queued_meanwhile() {
    let limiter = RouteRateLimiter::new(LatencyReference::new(0, false));
    let bucket = limiter.bucket("/channels/:id/messages");

    let running = limiter.admit(&bucket, false, false).await.unwrap();
    let mut later = limiter.enqueue(&bucket, false, false);
    assert!(later.try_recv().is_err());

    let mut retry = limiter.readmit(running, &bucket, false);
    let retry_slot = tokio::time::timeout(Duration::from_secs(5), &mut retry)
        .await
        .expect("retry admitted")
        .unwrap();
    assert!(later.try_recv().is_err(), "later request overtook the retry");

    drop(retry_slot);
    let later_slot = tokio::time::timeout(Duration::from_secs(5), later)
        .await
        .expect("later request admitted")
        .unwrap();
    drop(later_slot);
}
