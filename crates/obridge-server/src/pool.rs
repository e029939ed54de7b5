//! Bounded pool of live `MailAdapter` handles.
//!
//! Generalizes the teacher's `sqlmodel`-backed database connection pool
//! (handle lifecycle, idle/age-based retirement, a lightweight stats
//! sampler) from SQLite connections to Outlook adapter handles. See spec
//! §4.2.
//!
//! ## Borrow protocol
//!
//! `acquire(deadline)`: reuse an idle healthy handle if one exists;
//! otherwise build a new one if under `max_connections`; otherwise wait on
//! a FIFO queue until a handle is returned or the deadline elapses.
//!
//! ## Invariants
//!
//! At most `max_connections` handles exist at any time (idle + in-use +
//! under-construction). At most one caller ever holds a given handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use obridge_adapter::{AdapterError, AdapterResult, MailAdapter, ProbeOutcome};
use obridge_core::config::PoolConfig;
use obridge_core::metrics::Metrics;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

/// A live, exclusive connection to the mail store.
pub type SharedAdapter = Arc<dyn MailAdapter>;

/// Builds fresh [`SharedAdapter`] instances on demand. The pool never
/// constructs an adapter itself — it only decides *when* to, and hands the
/// work off to whatever the caller configured (a live Outlook binding in
/// production, `obridge_test_helpers::MockAdapter` in tests).
#[async_trait]
pub trait AdapterFactory: Send + Sync + 'static {
    async fn create(&self) -> AdapterResult<SharedAdapter>;
}

/// One live handle plus its bookkeeping. Mirrors the spec's `PoolHandle`
/// entity (§3).
pub struct PoolHandle {
    pub id: u64,
    pub adapter: SharedAdapter,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub probe_failures: u32,
}

/// What happened to a handle while it was checked out — drives whether
/// [`Pool::release`] keeps it warm or retires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The call completed (successfully or with a normal application
    /// error); the handle is still good.
    Healthy,
    /// The underlying connection itself is suspect — retire the handle.
    Unavailable,
    /// The call exceeded its deadline; the handle may be stuck, retire it.
    Timeout,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<PoolHandle>,
}

struct Inner {
    idle: VecDeque<PoolHandle>,
    total: usize,
    in_use: usize,
    waiters: VecDeque<Waiter>,
}

/// A bounded set of live adapter handles. See module docs.
pub struct Pool {
    factory: Arc<dyn AdapterFactory>,
    config: PoolConfig,
    inner: Arc<AsyncMutex<Inner>>,
    next_handle_id: AtomicU64,
    next_waiter_id: AtomicU64,
    metrics: &'static Metrics,
}

/// An acquired handle. Dropping it without calling [`PoolGuard::release`]
/// releases it as [`ReleaseOutcome::Healthy`].
pub struct PoolGuard {
    pool: Arc<Pool>,
    handle: Option<PoolHandle>,
}

impl PoolGuard {
    #[must_use]
    pub fn adapter(&self) -> &SharedAdapter {
        &self.handle.as_ref().expect("handle present until released").adapter
    }

    #[must_use]
    pub fn handle_id(&self) -> u64 {
        self.handle.as_ref().expect("handle present until released").id
    }

    /// Explicitly release with a known outcome (timeout, adapter failure,
    /// or healthy completion). Consumes the guard.
    pub fn release(mut self, outcome: ReleaseOutcome) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle, outcome);
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle, ReleaseOutcome::Healthy);
        }
    }
}

impl Pool {
    #[must_use]
    pub fn new(config: PoolConfig, factory: Arc<dyn AdapterFactory>, metrics: &'static Metrics) -> Arc<Self> {
        Arc::new(Self {
            factory,
            config,
            inner: Arc::new(AsyncMutex::new(Inner {
                idle: VecDeque::new(),
                total: 0,
                in_use: 0,
                waiters: VecDeque::new(),
            })),
            next_handle_id: AtomicU64::new(1),
            next_waiter_id: AtomicU64::new(1),
            metrics,
        })
    }

    /// Eagerly opens `min_connections` handles. If `strict` is true and the
    /// very first probe fails, returns the failure (used by the server's
    /// `strict_startup` config knob).
    pub async fn warm_up(&self, strict: bool) -> AdapterResult<()> {
        for i in 0..self.config.min_connections {
            match self.build_handle().await {
                Ok(handle) => {
                    let mut inner = self.inner.lock().await;
                    inner.idle.push_back(handle);
                }
                Err(err) if i == 0 && strict => return Err(err),
                Err(_) => break,
            }
        }
        Ok(())
    }

    async fn build_handle(&self) -> AdapterResult<PoolHandle> {
        let adapter = self.factory.create().await?;
        if let ProbeOutcome::Unavailable(reason) = adapter.probe().await {
            return Err(AdapterError::Unavailable(reason));
        }
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        Ok(PoolHandle {
            id,
            adapter,
            created_at: now,
            last_used_at: now,
            probe_failures: 0,
        })
    }

    /// Borrow a handle, waiting up to `deadline` if the pool is exhausted.
    pub async fn acquire(self: &Arc<Self>, deadline: Duration) -> AdapterResult<PoolGuard> {
        let deadline_at = Instant::now() + deadline;

        // Fast path: reuse an idle handle or build a new one under the cap.
        enum Action {
            Reuse(PoolHandle),
            Build,
            Wait(u64, oneshot::Receiver<PoolHandle>),
        }

        let action = {
            let mut inner = self.inner.lock().await;
            if let Some(handle) = inner.idle.pop_front() {
                inner.in_use += 1;
                Action::Reuse(handle)
            } else if inner.total < self.config.max_connections {
                inner.total += 1;
                inner.in_use += 1;
                Action::Build
            } else {
                let (tx, rx) = oneshot::channel();
                let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
                inner.waiters.push_back(Waiter { id, tx });
                Action::Wait(id, rx)
            }
        };

        let handle = match action {
            Action::Reuse(handle) => {
                self.metrics.pool_acquired.fetch_add(1, Ordering::Relaxed);
                handle
            }
            Action::Build => match self.build_handle().await {
                Ok(handle) => {
                    self.metrics.pool_acquired.fetch_add(1, Ordering::Relaxed);
                    handle
                }
                Err(err) => {
                    let mut inner = self.inner.lock().await;
                    inner.total -= 1;
                    inner.in_use -= 1;
                    return Err(err);
                }
            },
            Action::Wait(id, rx) => {
                let remaining = deadline_at.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, rx).await {
                    Ok(Ok(handle)) => {
                        self.metrics.pool_acquired.fetch_add(1, Ordering::Relaxed);
                        handle
                    }
                    Ok(Err(_)) => return Err(AdapterError::Timeout),
                    Err(_) => {
                        // Deadline hit. Try to cancel our own wait slot; if a
                        // release already handed us a handle in the race, give
                        // it straight back to the pool rather than losing it.
                        let mut inner = self.inner.lock().await;
                        if let Some(pos) = inner.waiters.iter().position(|w| w.id == id) {
                            inner.waiters.remove(pos);
                            drop(inner);
                        } else {
                            drop(inner);
                            if let Ok(handle) = rx.await {
                                self.release(handle, ReleaseOutcome::Healthy);
                            }
                        }
                        return Err(AdapterError::Timeout);
                    }
                }
            }
        };

        Ok(PoolGuard {
            pool: Arc::clone(self),
            handle: Some(handle),
        })
    }

    /// Return a handle to the pool, or retire it per `outcome`. Runs the
    /// state update on a spawned task so callers (including `PoolGuard`'s
    /// `Drop` impl) never block on the inner lock.
    fn release(&self, mut handle: PoolHandle, outcome: ReleaseOutcome) {
        handle.last_used_at = Instant::now();
        let inner_lock = Arc::clone(&self.inner);
        let metrics = self.metrics;
        tokio::spawn(async move {
            let mut inner = inner_lock.lock().await;
            match outcome {
                ReleaseOutcome::Healthy => {
                    let mut handle = handle;
                    while let Some(waiter) = inner.waiters.pop_front() {
                        match waiter.tx.send(handle) {
                            Ok(()) => return,
                            Err(returned) => handle = returned,
                        }
                    }
                    inner.in_use -= 1;
                    inner.idle.push_back(handle);
                }
                ReleaseOutcome::Unavailable | ReleaseOutcome::Timeout => {
                    inner.in_use -= 1;
                    inner.total -= 1;
                }
            }
            metrics.pool_released.fetch_add(1, Ordering::Relaxed);
        });
    }

    /// Snapshot of pool occupancy for the health probe.
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            idle: inner.idle.len(),
            in_use: inner.in_use,
            total: inner.total,
            waiters: inner.waiters.len(),
            max_connections: self.config.max_connections,
        }
    }

    /// Runs forever: retires idle-too-long/aged-out handles and probes the
    /// survivors, every `probe_interval`. Intended to be spawned once at
    /// startup and aborted on shutdown.
    pub async fn run_maintenance(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.probe_interval);
        loop {
            ticker.tick().await;
            self.maintenance_pass().await;
        }
    }

    async fn maintenance_pass(&self) {
        let mut survivors = VecDeque::new();
        let mut retired = 0usize;
        {
            let mut inner = self.inner.lock().await;
            while let Some(handle) = inner.idle.pop_front() {
                let keep_count = inner.idle.len() + survivors.len() + inner.in_use;
                let too_idle = handle.last_used_at.elapsed() > self.config.max_idle;
                let too_old = handle.created_at.elapsed() > self.config.max_age;
                if (too_idle || too_old) && keep_count >= self.config.min_connections {
                    inner.total -= 1;
                    retired += 1;
                } else {
                    survivors.push_back(handle);
                }
            }
            inner.idle = survivors;
        }
        if retired > 0 {
            self.metrics.pool_retired.fetch_add(retired as u64, Ordering::Relaxed);
        }

        // Probe the survivors; a failing probe retires that handle too.
        let to_probe: Vec<PoolHandle> = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.idle).into_iter().collect()
        };
        let mut still_healthy = VecDeque::new();
        for handle in to_probe {
            match handle.adapter.probe().await {
                ProbeOutcome::Ok => still_healthy.push_back(handle),
                ProbeOutcome::Unavailable(_) => {
                    self.metrics.probe_failures.fetch_add(1, Ordering::Relaxed);
                    let mut inner = self.inner.lock().await;
                    inner.total -= 1;
                }
            }
        }
        {
            let mut inner = self.inner.lock().await;
            inner.idle.extend(still_healthy);
            let deficit = self.config.min_connections.saturating_sub(inner.total);
            drop(inner);
            for _ in 0..deficit {
                if let Ok(handle) = self.build_handle().await {
                    let mut inner = self.inner.lock().await;
                    inner.idle.push_back(handle);
                    inner.total += 1;
                }
            }
        }
    }
}

/// Point-in-time occupancy, used by the health probe (spec §4.7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub total: usize,
    pub waiters: usize,
    pub max_connections: usize,
}
