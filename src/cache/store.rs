//! TTL Store Module
//!
//! Synchronous cache engine combining HashMap storage with LRU tracking and
//! lazy TTL expiration. Wrapped by [`TtlCache`](super::TtlCache) for shared
//! async access.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::error::{CoreError, Result};

// == TTL Store ==
#[derive(Debug)]
pub struct TtlStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    lru: LruTracker<K>,
    stats: CacheStats,
    max_entries: usize,
    default_ttl: Duration,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a store holding at most `max_entries` values (minimum one).
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry and resetting its TTL.
    ///
    /// At capacity, expired entries are swept first; if none were expired
    /// the least recently used entry is evicted.
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(CoreError::InvalidTtl);
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            if self.cleanup_expired() == 0 {
                if let Some(evicted) = self.lru.evict_oldest() {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
            }
        }

        self.entries.insert(key.clone(), CacheEntry::new(value, Some(ttl)));
        self.lru.touch(&key);
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Get ==
    /// Returns the value if present and fresh.
    ///
    /// Expired entries are removed on sight and counted as misses.
    pub fn get(&mut self, key: &K) -> Option<V> {
        if self.evict_if_expired(key) {
            self.stats.record_miss();
            return None;
        }

        match self.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Has ==
    /// Returns true if a fresh entry exists. Does not touch LRU order or stats.
    pub fn has(&mut self, key: &K) -> bool {
        !self.evict_if_expired(key) && self.entries.contains_key(key)
    }

    // == Delete ==
    /// Removes an entry, returning whether one was present.
    pub fn delete(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    /// Removes every entry matching the predicate and returns the count.
    pub fn delete_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let doomed: Vec<K> = self.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        self.stats.set_total_entries(self.entries.len());
        doomed.len()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    /// Remaining freshness of an entry, None if absent or expired.
    pub fn ttl_remaining(&mut self, key: &K) -> Option<Duration> {
        if self.evict_if_expired(key) {
            return None;
        }
        self.entries.get(key).and_then(CacheEntry::ttl_remaining)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.record_expirations(expired.len());
        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_expired(&mut self, key: &K) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(CacheEntry::is_expired)
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            self.stats.record_expirations(1);
            self.stats.set_total_entries(self.entries.len());
        }
        expired
    }
}
