//! Fingerprint-keyed response cache with TTL.
//!
//! Entries are keyed by a [`Fingerprint`] of the normalized request and carry
//! an absolute expiry. Expired entries are invisible to readers even before
//! they are physically removed: a read that finds one removes it and reports
//! a miss. Remaining expired entries are dropped by sweeps, either
//! opportunistically after a `put` or by a periodic task from
//! [`Cache::spawn_sweeper`].
//!
//! An optional [`CacheBackend`] makes entries survive restarts. Backend
//! failures never surface to callers: a corrupt or unreadable record is
//! logged and read as a miss.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use invoke_guard_cache::{Cache, Fingerprint};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Cache::builder().name("llm").max_entries(1_000).build();
//! let key = Fingerprint::of("llm", "complete", &json!({"prompt": "hello"}));
//!
//! cache.put(&key, Bytes::from_static(b"hi there"), Duration::from_secs(60)).await;
//! assert_eq!(cache.get(&key).await, Some(Bytes::from_static(b"hi there")));
//! # }
//! ```

mod backend;
mod clock;
mod config;
mod error;
mod events;
mod fingerprint;
mod store;

pub use backend::{CacheBackend, FileBackend};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::CacheError;
pub use events::CacheEvent;
pub use fingerprint::{canonicalize, Fingerprint};
pub use store::{CacheEntry, MAX_TTL};

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant, SystemTime};
use store::{Lookup, MemoryStore};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held in memory (may include expired, unswept ones).
    pub entries: usize,
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that returned nothing.
    pub misses: u64,
    /// Entries evicted from memory for space.
    pub evictions: u64,
    /// Entries removed because their TTL passed.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of reads that hit, or 0 when there were no reads.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

struct Inner {
    config: CacheConfig,
    store: Mutex<MemoryStore>,
    counters: Counters,
    last_sweep: Mutex<SystemTime>,
    sweeping: AtomicBool,
}

/// A shared, cloneable response cache.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.config.name)
            .field("entries", &self.len())
            .finish()
    }
}

impl Cache {
    /// Starts building a cache.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    pub(crate) fn from_config(config: CacheConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "cache_requests_total",
                "Total number of cache requests (hits and misses)"
            );
            describe_counter!("cache_evictions_total", "Total number of cache evictions");
            describe_counter!(
                "cache_corruptions_total",
                "Persisted cache records discarded because they could not be decoded"
            );
            describe_gauge!("cache_size", "Current number of entries in the cache");
        }

        let now = config.clock.now();
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(MemoryStore::new(config.max_entries)),
                config,
                counters: Counters::default(),
                last_sweep: Mutex::new(now),
                sweeping: AtomicBool::new(false),
            }),
        }
    }

    /// The name given at construction.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: CacheEvent) {
        self.inner.config.event_listeners.emit(&event);
    }

    /// Returns the value stored under `key` if it has not expired.
    ///
    /// On a memory miss the backing store, if any, is consulted and a live
    /// record is promoted into memory.
    pub async fn get(&self, key: &Fingerprint) -> Option<Bytes> {
        let now = self.inner.config.clock.now();
        let lookup = self.store().get(key, now);

        match lookup {
            Lookup::Hit(value) => {
                self.record_hit(key);
                return Some(value);
            }
            Lookup::Expired => {
                self.record_expired(key);
                if let Some(backend) = &self.inner.config.backend {
                    if let Err(e) = backend.remove(key.clone()).await {
                        tracing::warn!(cache = %self.name(), %key, error = %e, "failed to remove expired record");
                    }
                }
                self.record_miss(key);
                return None;
            }
            Lookup::Absent => {}
        }

        if let Some(value) = self.read_through(key, now).await {
            self.record_hit(key);
            return Some(value);
        }
        self.record_miss(key);
        None
    }

    async fn read_through(&self, key: &Fingerprint, now: SystemTime) -> Option<Bytes> {
        let backend = self.inner.config.backend.as_ref()?;
        match backend.load(key.clone()).await {
            Ok(Some(entry)) if entry.is_live(now) => {
                let value = entry.value.clone();
                let evicted = self.store().insert_if_absent(entry);
                if let Some(evicted) = evicted {
                    self.record_eviction(&evicted.key);
                }
                Some(value)
            }
            Ok(Some(_)) => {
                self.record_expired(key);
                if let Err(e) = backend.remove(key.clone()).await {
                    tracing::warn!(cache = %self.name(), %key, error = %e, "failed to remove expired record");
                }
                None
            }
            Ok(None) => None,
            Err(CacheError::Corruption { reason, .. }) => {
                tracing::warn!(cache = %self.name(), %key, %reason, "corrupt cache record treated as miss");
                #[cfg(feature = "metrics")]
                counter!("cache_corruptions_total", "cache" => self.name().to_string())
                    .increment(1);
                self.emit(CacheEvent::Corruption {
                    cache_name: self.name().to_string(),
                    timestamp: Instant::now(),
                    key: key.clone(),
                    reason,
                });
                let _ = backend.remove(key.clone()).await;
                None
            }
            Err(e) => {
                tracing::warn!(cache = %self.name(), %key, error = %e, "cache backend read failed");
                None
            }
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any existing entry.
    ///
    /// A zero `ttl` stores nothing. Backend write failures are logged and
    /// the in-memory entry is kept.
    pub async fn put(&self, key: &Fingerprint, value: Bytes, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = self.inner.config.clock.now();
        let entry = CacheEntry::new(key.clone(), value, now, ttl);

        let (evicted, size) = {
            let mut store = self.store();
            let evicted = store.insert(entry.clone());
            (evicted, store.len())
        };
        if let Some(evicted) = evicted {
            self.record_eviction(&evicted.key);
        }
        #[cfg(feature = "metrics")]
        gauge!("cache_size", "cache" => self.name().to_string()).set(size as f64);
        #[cfg(not(feature = "metrics"))]
        let _ = size;

        if let Some(backend) = &self.inner.config.backend {
            if let Err(e) = backend.store(entry).await {
                tracing::warn!(cache = %self.name(), %key, error = %e, "failed to persist cache entry");
            }
        }

        tracing::debug!(cache = %self.name(), %key, ttl_secs = ttl.as_secs_f64(), "cache entry stored");
        self.emit(CacheEvent::Stored {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            key: key.clone(),
        });

        self.maybe_sweep(now);
    }

    /// Removes the entry for `key` from memory and the backing store.
    pub async fn invalidate(&self, key: &Fingerprint) {
        self.store().remove(key);
        if let Some(backend) = &self.inner.config.backend {
            if let Err(e) = backend.remove(key.clone()).await {
                tracing::warn!(cache = %self.name(), %key, error = %e, "failed to remove cache record");
            }
        }
    }

    /// Removes every entry from memory and the backing store.
    pub async fn clear(&self) {
        self.store().clear();
        if let Some(backend) = &self.inner.config.backend {
            if let Err(e) = backend.clear().await {
                tracing::warn!(cache = %self.name(), error = %e, "failed to clear cache store");
            }
        }
        tracing::debug!(cache = %self.name(), "cache cleared");
    }

    /// Removes every expired entry now. Returns the number of distinct keys
    /// removed, whether they lived in memory, the backing store or both.
    pub async fn purge_expired(&self) -> usize {
        let now = self.inner.config.clock.now();
        let mut removed: HashSet<String> = self
            .store()
            .purge_expired(now)
            .into_iter()
            .map(|key| key.as_str().to_string())
            .collect();
        if let Some(backend) = &self.inner.config.backend {
            match backend.purge_expired(now).await {
                Ok(keys) => removed.extend(keys),
                Err(e) => {
                    tracing::warn!(cache = %self.name(), error = %e, "failed to sweep cache store")
                }
            }
        }
        let purged = removed.len();
        self.inner
            .counters
            .expirations
            .fetch_add(purged as u64, Ordering::Relaxed);
        *self
            .inner
            .last_sweep
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = now;

        tracing::debug!(cache = %self.name(), purged, "cache swept");
        self.emit(CacheEvent::Swept {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            purged,
        });
        purged
    }

    /// Starts a task that sweeps every `interval` until the cache is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Cache { inner }.purge_expired().await;
            }
        })
    }

    /// Starts a background sweep if the sweep interval has passed. Never
    /// waits for the sweep.
    fn maybe_sweep(&self, now: SystemTime) {
        let Some(interval) = self.inner.config.sweep_interval else {
            return;
        };
        let due = {
            let last = self
                .inner
                .last_sweep
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            now.duration_since(*last).unwrap_or_default() >= interval
        };
        if !due {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self
            .inner
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let cache = self.clone();
        handle.spawn(async move {
            cache.purge_expired().await;
            cache.inner.sweeping.store(false, Ordering::Release);
        });
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.store().len()
    }

    /// Returns true when memory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            entries: self.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self, key: &Fingerprint) {
        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = %self.name(), %key, "cache hit");
        #[cfg(feature = "metrics")]
        counter!("cache_requests_total", "cache" => self.name().to_string(), "result" => "hit")
            .increment(1);
        self.emit(CacheEvent::Hit {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            key: key.clone(),
        });
    }

    fn record_miss(&self, key: &Fingerprint) {
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = %self.name(), %key, "cache miss");
        #[cfg(feature = "metrics")]
        counter!("cache_requests_total", "cache" => self.name().to_string(), "result" => "miss")
            .increment(1);
        self.emit(CacheEvent::Miss {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            key: key.clone(),
        });
    }

    fn record_expired(&self, key: &Fingerprint) {
        self.inner.counters.expirations.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEvent::Expired {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            key: key.clone(),
        });
    }

    fn record_eviction(&self, key: &Fingerprint) {
        self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!("cache_evictions_total", "cache" => self.name().to_string()).increment(1);
        self.emit(CacheEvent::Evicted {
            cache_name: self.name().to_string(),
            timestamp: Instant::now(),
            key: key.clone(),
        });
    }
}
