//! Layered, byte-budgeted cache for folders, listings, and full emails.
//!
//! Generalizes the teacher's bounded-LRU result cache (one physical LRU,
//! logically partitioned by key shape, evicted by an overall byte budget
//! rather than a flat entry count) onto the three read paths spec §4.4
//! names: folder listings, email summary listings, and full emails. A
//! single in-flight map gives single-flight coalescing — concurrent
//! misses for the same key share one adapter call instead of stampeding it.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use obridge_adapter::AdapterResult;
use obridge_core::config::CacheConfig;
use obridge_core::metrics::Metrics;
use obridge_core::models::{EmailFull, EmailSummary, Folder};
use tokio::sync::{Mutex, Notify};

/// Identifies one cacheable query. `Eq`/`Hash` so it can key the LRU map
/// directly — there is no separate "cache section" concept, the key shape
/// alone determines which logical cache an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Folders,
    EmailList { folder_id: String, unread_only: bool, limit: u32 },
    Email { email_id: String },
    Search { query: String, folder_id: Option<String>, limit: u32 },
}

/// The cached payload for a [`CacheKey`]. One enum keeps all three logical
/// caches in a single `LruCache`, which is what lets them share one byte
/// budget and one eviction order.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Folders(Vec<Folder>),
    Emails(Vec<EmailSummary>),
    Email(Box<EmailFull>),
}

impl CacheValue {
    /// Rough serialized-size estimate, used only for the byte budget — does
    /// not need to be exact, just proportional and cheap.
    fn approx_bytes(&self) -> u64 {
        let n = match self {
            Self::Folders(items) => serde_json::to_vec(items).map(|v| v.len()).unwrap_or(256),
            Self::Emails(items) => serde_json::to_vec(items).map(|v| v.len()).unwrap_or(256),
            Self::Email(item) => serde_json::to_vec(item).map(|v| v.len()).unwrap_or(256),
        };
        n as u64
    }
}

struct Entry {
    value: CacheValue,
    expires_at: Instant,
    bytes: u64,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    total_bytes: u64,
}

/// One in-progress fetch: followers clone the `Arc` before the leader can
/// remove it from `InFlight::waiters`, so the stored result outlives the map
/// entry for however long a follower still needs to read it.
struct InFlightEntry {
    notify: Notify,
    result: std::sync::Mutex<Option<AdapterResult<CacheValue>>>,
}

/// Coalesces concurrent cache misses for the same key.
struct InFlight {
    waiters: Mutex<HashMap<CacheKey, Arc<InFlightEntry>>>,
}

/// Byte-budgeted cache shared by folder, listing, and full-email reads.
pub struct LayeredCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    in_flight: InFlight,
    metrics: &'static Metrics,
}

impl LayeredCache {
    #[must_use]
    pub fn new(config: CacheConfig, metrics: &'static Metrics) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                // Capacity is nominal; real eviction is byte-budget driven.
                // The LRU's own entry cap just bounds pathological numbers
                // of tiny entries.
                entries: LruCache::new(NonZeroUsize::new(100_000).expect("nonzero")),
                total_bytes: 0,
            }),
            in_flight: InFlight {
                waiters: Mutex::new(HashMap::new()),
            },
            metrics,
        }
    }

    fn ttl_for(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Folders => self.config.folder_ttl,
            CacheKey::EmailList { .. } | CacheKey::Email { .. } | CacheKey::Search { .. } => {
                self.config.email_ttl
            }
        }
    }

    async fn try_get(&self, key: &CacheKey) -> Option<CacheValue> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get(key) {
            if entry.expires_at > Instant::now() {
                let value = entry.value.clone();
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            // expired; remove it below
        } else {
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let stale = inner.entries.pop(key);
        if let Some(entry) = stale {
            inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
        }
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn put(&self, key: CacheKey, value: CacheValue) {
        let bytes = value.approx_bytes();
        let ttl = self.ttl_for(&key);
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.entries.push(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                bytes,
            },
        ) {
            // `push` evicted an entry to make room or replaced one at the
            // same key; either way, account for it leaving the budget.
            inner.total_bytes = inner.total_bytes.saturating_sub(old.1.bytes);
            self.metrics.cache_evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.total_bytes += bytes;
        while inner.total_bytes > self.config.max_bytes {
            let Some((_, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.bytes);
            self.metrics.cache_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Invalidate every cached email listing and full-email entry for a
    /// folder. Called after `send_email` with `save_to_sent` so the Sent
    /// Items listing doesn't serve stale data (spec §4.6).
    pub async fn invalidate_folder(&self, folder_id: &str) {
        let mut inner = self.inner.lock().await;
        let stale_keys: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter_map(|(key, _)| match key {
                CacheKey::EmailList { folder_id: fid, .. } if fid == folder_id => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in stale_keys {
            if let Some(entry) = inner.entries.pop(&key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
            }
        }
    }

    /// Returns the cached value for `key`, or runs `fetch` to populate it.
    /// Concurrent callers for the same key block on the first caller's
    /// fetch rather than each issuing their own adapter call; if that fetch
    /// fails, every waiter gets the same failure instead of each retrying
    /// the adapter on its own (spec §4.4: exactly one adapter call per
    /// in-flight key, failures propagate to all waiters).
    pub async fn get_or_fetch<F>(&self, key: CacheKey, fetch: F) -> AdapterResult<CacheValue>
    where
        F: std::future::Future<Output = AdapterResult<CacheValue>>,
    {
        if let Some(value) = self.try_get(&key).await {
            return Ok(value);
        }

        let entry = {
            let mut waiters = self.in_flight.waiters.lock().await;
            if let Some(existing) = waiters.get(&key) {
                Err(Arc::clone(existing))
            } else {
                let entry = Arc::new(InFlightEntry {
                    notify: Notify::new(),
                    result: std::sync::Mutex::new(None),
                });
                waiters.insert(key.clone(), Arc::clone(&entry));
                Ok(entry)
            }
        };

        let entry = match entry {
            Ok(leader_entry) => leader_entry,
            Err(follower_entry) => {
                // Someone else is already fetching this key. Wait for them,
                // then return whatever they got, success or failure, instead
                // of issuing a second adapter call.
                follower_entry.notify.notified().await;
                let result = follower_entry
                    .result
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone();
                return result.unwrap_or_else(|| {
                    Err(obridge_adapter::AdapterError::Permanent(
                        "in-flight fetch finished with no recorded result".to_string(),
                    ))
                });
            }
        };

        // We are the leader: run the fetch ourselves and hand the result to
        // anyone who queued up behind us.
        let result = fetch.await;
        if let Ok(value) = &result {
            self.put(key.clone(), value.clone()).await;
        }
        *entry.result.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result.clone());
        self.in_flight.waiters.lock().await.remove(&key);
        entry.notify.notify_waiters();
        result
    }
}
