//! Shared TTL Cache
//!
//! Cloneable async handle around a [`TtlStore`].

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{CacheStats, TtlStore};
use crate::error::Result;

/// Thread-safe TTL cache for one key namespace.
///
/// Each domain gets its own typed instance, so values keep their concrete
/// type instead of flowing through an untyped shared map.
pub struct TtlCache<K, V> {
    name: &'static str,
    store: Arc<RwLock<TtlStore<K, V>>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(name: &'static str, max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            name,
            store: Arc::new(RwLock::new(TtlStore::new(max_entries, default_ttl))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.store.write().await.get(key)
    }

    /// Stores a value. `ttl = None` uses the cache's default TTL.
    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        self.store.write().await.set(key, value, ttl)
    }

    pub async fn has(&self, key: &K) -> bool {
        self.store.write().await.has(key)
    }

    pub async fn del(&self, key: &K) -> bool {
        self.store.write().await.delete(key)
    }

    pub async fn del_where(&self, predicate: impl FnMut(&K) -> bool) -> usize {
        self.store.write().await.delete_where(predicate)
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn ttl_remaining(&self, key: &K) -> Option<Duration> {
        self.store.write().await.ttl_remaining(key)
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store.write().await.cleanup_expired()
    }

    // == Get Or Set ==
    /// Returns the fresh cached value, or runs `fetcher` and caches its result.
    ///
    /// The lock is released while the fetcher runs, so two concurrent misses
    /// on the same key both fetch; pair with a
    /// [`Coalescer`](crate::coalesce::Coalescer) to collapse them. A failed
    /// fetch writes nothing. A value that cannot be stored (zero TTL) is still
    /// returned to the caller.
    pub async fn get_or_set<F, Fut>(&self, key: K, fetcher: F, ttl: Option<Duration>) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key).await {
            debug!(cache = self.name, ?key, "cache hit");
            return Ok(value);
        }

        debug!(cache = self.name, ?key, "cache miss, fetching");
        let value = fetcher().await?;
        if let Err(err) = self.set(key, value.clone(), ttl).await {
            warn!(cache = self.name, error = %err, "fetched value not cached");
        }
        Ok(value)
    }
}
