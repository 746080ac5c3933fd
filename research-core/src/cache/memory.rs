//! Bounded in-process tier: strict LRU by access order plus per-entry expiry.

use super::CachedValue;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: CachedValue,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

/// Fast tier storage. Not synchronised; [`super::TieredCache`] keeps it behind
/// a single mutex and never awaits while holding it.
#[derive(Debug)]
pub(crate) struct MemoryTier {
    entries: LruCache<String, Entry>,
    ttl: Duration,
    evictions: u64,
    expirations: u64,
}

impl MemoryTier {
    pub(crate) fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(capacity),
            ttl,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Look up `key`, refreshing its recency. Expired entries are removed and
    /// reported as a miss.
    pub(crate) fn get_at(&mut self, key: &str, now: Instant) -> Option<CachedValue> {
        let expired = self
            .entries
            .get(key)?
            .expires_at
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.pop(key);
            self.expirations += 1;
            return None;
        }
        self.entries.peek(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key`, evicting the least recently used entry when full.
    pub(crate) fn insert_at(&mut self, key: String, value: CachedValue, now: Instant) {
        let entry = Entry {
            value,
            expires_at: now.checked_add(self.ttl),
        };
        if let Some((old_key, _)) = self.entries.push(key.clone(), entry) {
            if old_key != key {
                self.evictions += 1;
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions
    }

    pub(crate) fn expirations(&self) -> u64 {
        self.expirations
    }

    /// Drop every entry and reset the counters.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.evictions = 0;
        self.expirations = 0;
    }
}
