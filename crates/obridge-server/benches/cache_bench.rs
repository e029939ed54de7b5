//! Criterion benchmarks for the layered result cache: hit-path latency
//! versus a cold fetch, and single-flight coalescing under concurrent
//! misses for the same key.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use obridge_core::config::CacheConfig;
use obridge_core::metrics::Metrics;
use obridge_server::cache::{CacheKey, CacheValue, LayeredCache};

fn cache() -> LayeredCache {
    let config = CacheConfig {
        max_bytes: 16 * 1024 * 1024,
        email_ttl: Duration::from_secs(60),
        folder_ttl: Duration::from_secs(60),
        cleanup_interval: Duration::from_secs(300),
    };
    LayeredCache::new(config, Box::leak(Box::new(Metrics::new())))
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = cache();
    rt.block_on(cache.get_or_fetch(CacheKey::Folders, async { Ok(CacheValue::Folders(vec![])) }))
        .unwrap();

    c.bench_function("cache_get_or_fetch_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let value = cache
                    .get_or_fetch(CacheKey::Folders, async { Ok(CacheValue::Folders(vec![])) })
                    .await
                    .unwrap();
                black_box(value);
            });
        });
    });
}

fn bench_cache_miss_then_populate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("cache_get_or_fetch_cold", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cache = cache();
                let value = cache
                    .get_or_fetch(CacheKey::Folders, async { Ok(CacheValue::Folders(vec![])) })
                    .await
                    .unwrap();
                black_box(value);
            });
        });
    });
}

fn bench_coalesced_concurrent_miss(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("cache_16_concurrent_misses_same_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cache = Arc::new(cache());
                let fetch_count = Arc::new(AtomicU64::new(0));
                let mut handles = Vec::with_capacity(16);
                for _ in 0..16 {
                    let cache = Arc::clone(&cache);
                    let fetch_count = Arc::clone(&fetch_count);
                    handles.push(tokio::spawn(async move {
                        cache
                            .get_or_fetch(CacheKey::Folders, async {
                                fetch_count.fetch_add(1, Ordering::Relaxed);
                                tokio::time::sleep(Duration::from_micros(50)).await;
                                Ok(CacheValue::Folders(vec![]))
                            })
                            .await
                            .unwrap()
                    }));
                }
                for handle in handles {
                    black_box(handle.await.unwrap());
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_cache_miss_then_populate,
    bench_coalesced_concurrent_miss,
);
criterion_main!(benches);
