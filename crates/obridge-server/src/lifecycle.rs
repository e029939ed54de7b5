//! Server core: lifecycle state machine, admission/backpressure gate, and
//! the shared `ServerContext` every handler closes over. See spec §4.7 and
//! §9 "Globals and module-level singletons" — this replaces the source's
//! process-wide singletons with one explicit, constructible context.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use obridge_adapter::{AdapterError, AdapterResult};
use obridge_core::config::Config;
use obridge_core::metrics::{global_metrics, Metrics, MetricsSnapshot};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cache::LayeredCache;
use crate::pool::{AdapterFactory, Pool};
use crate::rate_limit::{CallerKey, RateLimiter};

/// Process lifecycle states (spec §4.7): `initializing → running → draining
/// → stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// Per-request context threaded through the router and handlers: the
/// request's absolute deadline, a correlation id, and the caller identity
/// the rate limiter segments on (if the transport provides one).
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub deadline: Instant,
    pub request_id: u64,
    pub caller: CallerKey,
}

impl RequestCtx {
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Everything a handler needs: pool, limiter, cache, config, metrics, and
/// the process lifecycle state. Constructed once at startup and passed by
/// `Arc` through the router and into every handler — no singletons.
pub struct ServerContext {
    pub config: Config,
    pub pool: Arc<Pool>,
    pub rate_limiter: RateLimiter,
    pub cache: LayeredCache,
    pub metrics: &'static Metrics,
    state: std::sync::atomic::AtomicU8,
    admission: Semaphore,
    in_flight: AtomicUsize,
    next_request_id: AtomicU64,
    started_at: Instant,
}

/// Snapshot returned by the `GET /health` endpoint and an internal
/// diagnostics method, mirroring spec §4.7's health probe shape.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: LifecycleState,
    pub outlook_connected: bool,
    pub pool_stats: crate::pool::PoolStats,
    pub cache_stats: MetricsSnapshot,
    pub uptime_secs: f64,
}

const STATE_INITIALIZING: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_DRAINING: u8 = 2;
const STATE_STOPPED: u8 = 3;

fn state_from_u8(v: u8) -> LifecycleState {
    match v {
        STATE_RUNNING => LifecycleState::Running,
        STATE_DRAINING => LifecycleState::Draining,
        STATE_STOPPED => LifecycleState::Stopped,
        _ => LifecycleState::Initializing,
    }
}

impl ServerContext {
    /// Constructs a context without opening any pool connections yet; call
    /// [`ServerContext::start`] to warm the pool and transition to
    /// `Running`.
    #[must_use]
    pub fn new(config: Config, factory: Arc<dyn AdapterFactory>) -> Arc<Self> {
        let metrics = global_metrics();
        let pool = Pool::new(config.pool.clone(), factory, metrics);
        let rate_limiter = RateLimiter::new(config.rate_limit.clone(), metrics);
        let cache = LayeredCache::new(config.cache.clone(), metrics);
        let max_concurrent = config.max_concurrent_requests;
        Arc::new(Self {
            config,
            pool,
            rate_limiter,
            cache,
            metrics,
            state: std::sync::atomic::AtomicU8::new(STATE_INITIALIZING),
            admission: Semaphore::new(max_concurrent),
            in_flight: AtomicUsize::new(0),
            next_request_id: AtomicU64::new(1),
            started_at: Instant::now(),
        })
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Warms the pool to `min_connections` and moves to `Running`. If
    /// `strict_startup` is set and the very first probe fails, the error
    /// propagates (exit code 1 per spec §6) instead of starting degraded.
    ///
    /// # Errors
    /// Propagates the pool's warm-up failure when `strict_startup` is set.
    pub async fn start(&self) -> AdapterResult<()> {
        self.pool.warm_up(self.config.strict_startup).await?;
        self.state.store(STATE_RUNNING, Ordering::Release);
        info!(state = "running", "server core started");
        Ok(())
    }

    /// Allocates the next monotonic request id, used for log correlation
    /// and cache diagnostics.
    #[must_use]
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds a [`RequestCtx`] with the effective deadline: the smaller of
    /// the client-supplied timeout (if any) and the server's
    /// `request_timeout` (spec §5 "Cancellation").
    #[must_use]
    pub fn request_ctx(&self, client_timeout: Option<Duration>, caller: CallerKey) -> RequestCtx {
        let server_timeout = self.config.request_timeout;
        let effective = match client_timeout {
            Some(client) => client.min(server_timeout),
            None => server_timeout,
        };
        RequestCtx {
            deadline: Instant::now() + effective,
            request_id: self.next_request_id(),
            caller,
        }
    }

    /// Admission gate: bounds concurrent in-flight requests to
    /// `max_concurrent_requests`. Waits up to a short queue deadline before
    /// returning `Overloaded` (spec §4.7).
    ///
    /// # Errors
    /// Returns [`AdapterError::Unavailable`] (mapped by the caller to
    /// `overloaded`) if the semaphore stays full past the queue deadline.
    pub async fn admit(&self) -> AdapterResult<AdmissionPermit<'_>> {
        const QUEUE_DEADLINE: Duration = Duration::from_millis(200);
        match tokio::time::timeout(QUEUE_DEADLINE, self.admission.acquire()).await {
            Ok(Ok(permit)) => {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                Ok(AdmissionPermit { ctx: self, _permit: permit })
            }
            Ok(Err(_)) => Err(AdapterError::Unavailable("admission semaphore closed".to_string())),
            Err(_) => Err(AdapterError::Unavailable("overloaded".to_string())),
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Point-in-time health snapshot for the `GET /health` endpoint.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            outlook_connected: self.pool.stats().await.total > 0,
            pool_stats: self.pool.stats().await,
            cache_stats: self.metrics.snapshot(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }

    /// Begins graceful shutdown: stop accepting new sessions, give
    /// outstanding requests `shutdown_grace` to finish, then close the
    /// pool. Spec §4.7.
    pub async fn shutdown(&self) {
        self.state.store(STATE_DRAINING, Ordering::Release);
        info!(state = "draining", "shutdown requested");

        let deadline = Instant::now() + self.config.shutdown_grace;
        while self.in_flight() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if self.in_flight() > 0 {
            warn!(
                in_flight = self.in_flight(),
                "shutdown grace period elapsed with requests still outstanding"
            );
        }

        self.state.store(STATE_STOPPED, Ordering::Release);
        info!(state = "stopped", "shutdown complete");
    }
}

/// RAII admission ticket; dropping it frees the concurrency slot and
/// decrements the in-flight counter.
pub struct AdmissionPermit<'a> {
    ctx: &'a ServerContext,
    _permit: tokio::sync::SemaphorePermit<'a>,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.ctx.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
