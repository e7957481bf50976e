use crate::backend::CacheBackend;
use crate::clock::{Clock, SystemClock};
use crate::events::CacheEvent;
use crate::fingerprint::Fingerprint;
use crate::Cache;
use invoke_guard_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`Cache`].
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) max_entries: Option<usize>,
    pub(crate) sweep_interval: Option<Duration>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) backend: Option<Arc<dyn CacheBackend>>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
}

/// Builder for [`Cache`].
pub struct CacheConfigBuilder {
    name: String,
    max_entries: Option<usize>,
    sweep_interval: Option<Duration>,
    clock: Arc<dyn Clock>,
    backend: Option<Arc<dyn CacheBackend>>,
    event_listeners: EventListeners<CacheEvent>,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfigBuilder {
    /// Creates a builder.
    ///
    /// Defaults:
    /// - unbounded memory
    /// - sweep on put at most once per 60 seconds
    /// - system clock, no backing store
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_entries: None,
            sweep_interval: Some(Duration::from_secs(60)),
            clock: Arc::new(SystemClock),
            backend: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name used in events, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bounds the in-memory map; the least recently used entry is evicted
    /// when full. Zero means unbounded.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = (max_entries > 0).then_some(max_entries);
        self
    }

    /// Minimum time between opportunistic sweeps triggered by `put`.
    /// `None` disables them.
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Replaces the wall clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a persistent backing store.
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Registers a callback invoked on every hit.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fingerprint) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Hit { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked on every miss.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fingerprint) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Miss { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked when an entry is evicted for space.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fingerprint) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Evicted { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked when a corrupt persisted record is discarded.
    pub fn on_corruption<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fingerprint, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Corruption { key, reason, .. } = event {
                f(key, reason);
            }
        }));
        self
    }

    /// Registers a listener for every cache event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the cache.
    pub fn build(self) -> Cache {
        Cache::from_config(CacheConfig {
            name: self.name,
            max_entries: self.max_entries,
            sweep_interval: self.sweep_interval,
            clock: self.clock,
            backend: self.backend,
            event_listeners: self.event_listeners,
        })
    }
}
