//! In-memory entry storage.

use crate::fingerprint::Fingerprint;
use bytes::Bytes;
use std::num::NonZeroUsize;
use std::time::{Duration, SystemTime};

/// Longest TTL an entry can carry. Longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cached response and its validity window.
///
/// Entries are never mutated; a newer `put` replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The request fingerprint.
    pub key: Fingerprint,
    /// The cached response body.
    pub value: Bytes,
    /// When the entry was stored.
    pub created_at: SystemTime,
    /// First instant at which the entry is no longer visible.
    pub expires_at: SystemTime,
}

impl CacheEntry {
    /// Creates an entry that lives for `ttl` from `now`, at most [`MAX_TTL`].
    ///
    /// If even the clamped expiry is unrepresentable the entry is born
    /// expired.
    pub fn new(key: Fingerprint, value: Bytes, now: SystemTime, ttl: Duration) -> Self {
        Self {
            key,
            value,
            created_at: now,
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
        }
    }

    /// Returns true while `now < expires_at`.
    pub fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// Result of a memory lookup.
#[derive(Debug)]
pub(crate) enum Lookup {
    Hit(Bytes),
    Expired,
    Absent,
}

/// LRU map of live entries, optionally bounded.
pub(crate) struct MemoryStore {
    entries: lru::LruCache<Fingerprint, CacheEntry>,
}

impl MemoryStore {
    pub(crate) fn new(max_entries: Option<usize>) -> Self {
        let entries = match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => lru::LruCache::new(cap),
            None => lru::LruCache::unbounded(),
        };
        Self { entries }
    }

    /// Looks up `key`, removing it if it has expired.
    pub(crate) fn get(&mut self, key: &Fingerprint, now: SystemTime) -> Lookup {
        match self.entries.get(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_live(now) => Lookup::Hit(entry.value.clone()),
            Some(_) => {
                self.entries.pop(key);
                Lookup::Expired
            }
        }
    }

    /// Inserts or replaces an entry. Returns the entry evicted to make room,
    /// never the entry being replaced.
    pub(crate) fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let key = entry.key.clone();
        match self.entries.push(key.clone(), entry) {
            Some((old_key, _)) if old_key == key => None,
            Some((_, evicted)) => Some(evicted),
            None => None,
        }
    }

    /// Inserts only when nothing newer is already held for the key.
    pub(crate) fn insert_if_absent(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        if self.entries.contains(&entry.key) {
            return None;
        }
        self.insert(entry)
    }

    pub(crate) fn remove(&mut self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.pop(key)
    }

    /// Drops every expired entry and returns the dropped keys.
    pub(crate) fn purge_expired(&mut self, now: SystemTime) -> Vec<Fingerprint> {
        let expired: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
