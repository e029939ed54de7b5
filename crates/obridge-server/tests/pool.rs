//! Pool invariants from spec §8: bounded occupancy, no shared handles, and
//! bounded wrap-up after a timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use obridge_core::config::PoolConfig;
use obridge_core::metrics::Metrics;
use obridge_server::pool::{Pool, ReleaseOutcome};
use obridge_test_helpers::{FixedAdapterFactory, MockAdapter, MockBehavior};

fn leaked_metrics() -> &'static Metrics {
    Box::leak(Box::new(Metrics::new()))
}

fn test_pool(max_connections: usize, adapter: Arc<MockAdapter>) -> Arc<Pool> {
    let config = PoolConfig {
        min_connections: 0,
        max_connections,
        max_idle: Duration::from_secs(300),
        max_age: Duration::from_secs(3600),
        probe_interval: Duration::from_secs(30),
    };
    let factory = Arc::new(FixedAdapterFactory::new(adapter));
    Pool::new(config, factory, leaked_metrics())
}

#[tokio::test]
async fn acquire_then_release_never_grows_past_max_connections() {
    let pool = test_pool(2, Arc::new(MockAdapter::with_sample_inbox(0)));
    for _ in 0..20 {
        let guard = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let stats = pool.stats().await;
        assert!(stats.total <= 2);
        guard.release(ReleaseOutcome::Healthy);
    }
    let stats = pool.stats().await;
    assert!(stats.total <= 2);
    assert_eq!(stats.in_use, 0);
}

#[tokio::test]
async fn concurrent_acquires_respect_the_connection_cap() {
    let pool = test_pool(3, Arc::new(MockAdapter::with_sample_inbox(0)));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let pool = Arc::clone(&pool);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let guard = pool.acquire(Duration::from_millis(500)).await.unwrap();
            let stats = pool.stats().await;
            peak.fetch_max(stats.in_use, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(10)).await;
            guard.release(ReleaseOutcome::Healthy);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::Relaxed) <= 3);
    let stats = pool.stats().await;
    assert!(stats.total <= 3);
    assert_eq!(stats.waiters, 0);
}

#[tokio::test]
async fn two_concurrently_held_guards_never_share_a_handle_id() {
    let pool = test_pool(2, Arc::new(MockAdapter::with_sample_inbox(0)));
    let first = pool.acquire(Duration::from_millis(100)).await.unwrap();
    let second = pool.acquire(Duration::from_millis(100)).await.unwrap();
    assert_ne!(first.handle_id(), second.handle_id());
    first.release(ReleaseOutcome::Healthy);
    second.release(ReleaseOutcome::Healthy);
}

#[tokio::test]
async fn timed_out_acquire_does_not_leave_the_pool_stuck() {
    let adapter = Arc::new(MockAdapter::with_sample_inbox(0));
    adapter.set_behavior(MockBehavior {
        call_latency: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let pool = test_pool(1, adapter);

    let held = pool.acquire(Duration::from_millis(50)).await.unwrap();
    let start = std::time::Instant::now();
    let second = pool.acquire(Duration::from_millis(60)).await;
    assert!(second.is_err(), "pool is exhausted, the waiter must time out");
    assert!(start.elapsed() < Duration::from_millis(160));

    held.release(ReleaseOutcome::Timeout);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.total, 0);
    assert_eq!(stats.in_use, 0);

    let fresh = pool.acquire(Duration::from_millis(100)).await.unwrap();
    fresh.release(ReleaseOutcome::Healthy);
}
