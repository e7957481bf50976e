use crate::fingerprint::Fingerprint;
use invoke_guard_core::events::GuardEvent;
use std::time::Instant;

/// Events emitted by the cache.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A live entry was found.
    Hit {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
    },
    /// No live entry was found.
    Miss {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
    },
    /// An entry was written.
    Stored {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
    },
    /// An expired entry was found on read and removed.
    Expired {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
    },
    /// An entry was evicted from memory to make room.
    Evicted {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
    },
    /// A persisted record could not be decoded and was discarded.
    Corruption {
        cache_name: String,
        timestamp: Instant,
        key: Fingerprint,
        reason: String,
    },
    /// A sweep finished.
    Swept {
        cache_name: String,
        timestamp: Instant,
        purged: usize,
    },
}

impl GuardEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Stored { .. } => "stored",
            CacheEvent::Expired { .. } => "expired",
            CacheEvent::Evicted { .. } => "evicted",
            CacheEvent::Corruption { .. } => "corruption",
            CacheEvent::Swept { .. } => "swept",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Stored { timestamp, .. }
            | CacheEvent::Expired { timestamp, .. }
            | CacheEvent::Evicted { timestamp, .. }
            | CacheEvent::Corruption { timestamp, .. }
            | CacheEvent::Swept { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            CacheEvent::Hit { cache_name, .. }
            | CacheEvent::Miss { cache_name, .. }
            | CacheEvent::Stored { cache_name, .. }
            | CacheEvent::Expired { cache_name, .. }
            | CacheEvent::Evicted { cache_name, .. }
            | CacheEvent::Corruption { cache_name, .. }
            | CacheEvent::Swept { cache_name, .. } => cache_name,
        }
    }
}
