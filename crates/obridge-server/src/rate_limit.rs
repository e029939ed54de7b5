//! Per-caller token-bucket rate limiting with secondary minute/hour caps.
//!
//! See spec §4.3. A caller gets a burst allowance (`burst` tokens,
//! refilled at `rps` tokens/sec) plus two fixed-window backstops so a
//! caller can't sit right at the edge of the token bucket and still blow
//! through a sane per-minute/per-hour budget. Buckets are created lazily
//! per caller and kept in a bounded LRU so an unbounded set of distinct
//! callers can't grow the limiter's memory without bound; callers that
//! fall out of the LRU simply start over with a fresh bucket, which is an
//! acceptable approximation for an abuse backstop.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use obridge_core::config::RateLimitConfig;
use obridge_core::metrics::Metrics;
use tokio::sync::Mutex;

/// Key identifying the caller a bucket belongs to. `None` buckets under a
/// single shared key, giving one global limiter when the transport has no
/// notion of caller identity (e.g. a single stdio peer).
pub type CallerKey = Option<String>;

/// Returned when a request must be rejected; carries the JSON-RPC
/// `retry_after` hint (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct RateLimited {
    pub retry_after: Duration,
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Attempts to take one token. On failure, returns the wait until a
    /// token would next be available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

struct FixedWindow {
    limit: u32,
    duration: Duration,
    window_start: Instant,
    count: u32,
}

impl FixedWindow {
    fn new(limit: u32, duration: Duration) -> Self {
        Self {
            limit,
            duration,
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        if now.duration_since(self.window_start) >= self.duration {
            self.window_start = now;
            self.count = 0;
        }
        if self.count < self.limit {
            self.count += 1;
            Ok(())
        } else {
            let remaining = self.duration - now.duration_since(self.window_start);
            Err(remaining)
        }
    }
}

struct Bucket {
    tokens: TokenBucket,
    per_minute: Option<FixedWindow>,
    per_hour: Option<FixedWindow>,
}

impl Bucket {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: TokenBucket::new(f64::from(config.burst), config.rps),
            per_minute: config
                .per_minute
                .map(|limit| FixedWindow::new(limit, Duration::from_secs(60))),
            per_hour: config
                .per_hour
                .map(|limit| FixedWindow::new(limit, Duration::from_secs(3600))),
        }
    }

    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.tokens.try_take(now)?;
        if let Some(window) = &mut self.per_minute {
            window.try_take(now)?;
        }
        if let Some(window) = &mut self.per_hour {
            window.try_take(now)?;
        }
        Ok(())
    }
}

const MAX_TRACKED_CALLERS: usize = 4096;

/// Guards every inbound request. Cheap to clone (wraps an `Arc` via the
/// caller passing this around behind their own `Arc<RateLimiter>`).
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<LruCache<CallerKey, Bucket>>,
    metrics: &'static Metrics,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig, metrics: &'static Metrics) -> Self {
        Self {
            config,
            buckets: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_TRACKED_CALLERS).expect("constant is nonzero"),
            )),
            metrics,
        }
    }

    /// Checks (and consumes, on success) one unit of rate budget for
    /// `caller`. On a miss, sleeps up to the smaller of the wait until a
    /// token would next be available and `remaining_deadline`, then retries
    /// once — only denying if the wait would have to exceed the deadline
    /// (spec §4.3).
    pub async fn check(&self, caller: CallerKey, remaining_deadline: Duration) -> Result<(), RateLimited> {
        if let Some(retry_after) = self.try_take(&caller).await {
            let sleep_for = retry_after.min(remaining_deadline);
            tokio::time::sleep(sleep_for).await;
            if let Some(retry_after) = self.try_take(&caller).await {
                self.metrics.rate_limit_denials.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(RateLimited { retry_after });
            }
        }
        Ok(())
    }

    /// Attempts to take one token; `None` on success, `Some(wait)` on a miss.
    async fn try_take(&self, caller: &CallerKey) -> Option<Duration> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.get_or_insert_mut(caller.clone(), || Bucket::new(&self.config));
        bucket.try_take(now).err()
    }
}
