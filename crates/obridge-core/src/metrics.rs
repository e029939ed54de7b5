//! Process-wide observability counters.
//!
//! Lock-free atomic counters for the events spec §4.9 names: request
//! start/finish, pool acquire/release/retire, cache hit/miss/evict,
//! rate-limit denial, handle probe failure. These back the `health`
//! endpoint's `pool_stats`/`cache_stats` fields; per-request detail is
//! emitted as `tracing` events, not accumulated here.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance. One per process — there is exactly one bridge
/// server per process, so a singleton avoids threading a handle through
/// every call site that just wants to bump a counter.
static METRICS: Metrics = Metrics::new();

#[must_use]
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Atomic counters for the bridge's lifetime. All fields use `Relaxed`
/// ordering — these are independent counters with no cross-field
/// invariants that require synchronization.
#[derive(Debug)]
pub struct Metrics {
    pub requests_received: AtomicU64,
    pub requests_completed: AtomicU64,
    pub requests_failed: AtomicU64,
    pub pool_acquired: AtomicU64,
    pub pool_released: AtomicU64,
    pub pool_retired: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_evictions: AtomicU64,
    pub rate_limit_denials: AtomicU64,
    pub probe_failures: AtomicU64,
}

impl Metrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_completed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            pool_acquired: AtomicU64::new(0),
            pool_released: AtomicU64::new(0),
            pool_retired: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_evictions: AtomicU64::new(0),
            rate_limit_denials: AtomicU64::new(0),
            probe_failures: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            pool_acquired: self.pool_acquired.load(Ordering::Relaxed),
            pool_released: self.pool_released.load(Ordering::Relaxed),
            pool_retired: self.pool_retired.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            rate_limit_denials: self.rate_limit_denials.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`Metrics`], serializable for the health probe.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_received: u64,
    pub requests_completed: u64,
    pub requests_failed: u64,
    pub pool_acquired: u64,
    pub pool_released: u64,
    pub pool_retired: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub rate_limit_denials: u64,
    pub probe_failures: u64,
}

impl MetricsSnapshot {
    /// Cache hit rate in `[0.0, 1.0]`; `0.0` if there have been no lookups.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
