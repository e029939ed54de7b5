//! Criterion benchmarks for adapter pool acquire/release throughput.
//!
//! Compares an uncontended pool (capacity well above concurrency) against a
//! saturated one (capacity 1, every acquire waits on the previous release)
//! to show the cost of queueing under the `oneshot` waiter path.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use obridge_core::config::PoolConfig;
use obridge_core::metrics::Metrics;
use obridge_server::pool::{Pool, ReleaseOutcome};
use obridge_test_helpers::{FixedAdapterFactory, MockAdapter};

fn pool(max_connections: usize) -> Arc<Pool> {
    let config = PoolConfig {
        min_connections: 0,
        max_connections,
        max_idle: Duration::from_secs(300),
        max_age: Duration::from_secs(3600),
        probe_interval: Duration::from_secs(30),
    };
    let adapter = Arc::new(MockAdapter::with_sample_inbox(0));
    let factory = Arc::new(FixedAdapterFactory::new(adapter));
    Pool::new(config, factory, Box::leak(Box::new(Metrics::new())))
}

fn bench_uncontended_acquire_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = pool(64);

    c.bench_function("pool_acquire_release_uncontended", |b| {
        b.iter(|| {
            rt.block_on(async {
                let guard = pool.acquire(Duration::from_millis(500)).await.unwrap();
                black_box(guard.handle_id());
                guard.release(ReleaseOutcome::Healthy);
            });
        });
    });
}

fn bench_saturated_acquire_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = pool(1);

    c.bench_function("pool_acquire_release_saturated_cap_1", |b| {
        b.iter(|| {
            rt.block_on(async {
                let guard = pool.acquire(Duration::from_millis(500)).await.unwrap();
                black_box(guard.handle_id());
                guard.release(ReleaseOutcome::Healthy);
            });
        });
    });
}

fn bench_concurrent_acquire_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = pool(8);

    c.bench_function("pool_16_concurrent_waiters_cap_8", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::with_capacity(16);
                for _ in 0..16 {
                    let pool = Arc::clone(&pool);
                    handles.push(tokio::spawn(async move {
                        let guard = pool.acquire(Duration::from_secs(1)).await.unwrap();
                        guard.release(ReleaseOutcome::Healthy);
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_uncontended_acquire_release,
    bench_saturated_acquire_release,
    bench_concurrent_acquire_release,
);
criterion_main!(benches);
