//! Domain Fetchers
//!
//! Named read paths that combine a typed TTL cache, a coalescer and, for
//! locations, a batcher over the [`Backend`]. Each one is configuration:
//! a cache key, a TTL, a dedupe window and a failure policy.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{CacheStats, TtlCache};
use crate::coalesce::{Batcher, Coalescer};
use crate::config::{Config, FetchPolicy};
use crate::error::{CoreError, Result};
use crate::fetchers::Backend;
use crate::models::{FeedItem, Location, Story};
use crate::pagination::{CursorPaginator, Page, PaginatorOptions};

pub fn onboarding_key(user_id: &str) -> String {
    format!("onboarding:{user_id}")
}

pub fn stories_key(user_id: &str) -> String {
    format!("stories:{user_id}")
}

pub fn location_key(id: &str) -> String {
    format!("location:{id}")
}

pub fn feed_key(cursor: Option<&str>, page_size: usize) -> String {
    format!("feed:{}:{}", cursor.unwrap_or("start"), page_size)
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(CoreError::InvalidKey(format!("{kind} id cannot be empty")));
    }
    Ok(())
}

/// Cache in front of a coalescer, one per domain.
struct ReadThrough<V> {
    cache: TtlCache<String, V>,
    coalescer: Coalescer<V>,
    policy: FetchPolicy,
}

impl<V> Clone for ReadThrough<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            coalescer: self.coalescer.clone(),
            policy: self.policy,
        }
    }
}

impl<V> ReadThrough<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(name: &'static str, max_entries: usize, policy: FetchPolicy) -> Self {
        Self {
            cache: TtlCache::new(name, max_entries, policy.ttl),
            coalescer: Coalescer::new(name, policy.dedupe_window),
            policy,
        }
    }

    async fn fetch<F, Fut>(&self, key: String, fetcher: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let coalescer_key = key.clone();
        self.cache
            .get_or_set(
                key,
                || {
                    self.coalescer.coalesce_within(
                        coalescer_key,
                        self.policy.dedupe_window,
                        fetcher,
                    )
                },
                Some(self.policy.ttl),
            )
            .await
    }

    async fn invalidate(&self, key: &str) -> bool {
        self.coalescer.forget(key);
        self.cache.del(&key.to_string()).await
    }
}

// == Domain Fetchers ==
/// Entry point for every cached read the application makes.
///
/// Construct once at startup and share by cloning; clones share caches and
/// in-flight requests.
#[derive(Clone)]
pub struct DomainFetchers {
    backend: Arc<dyn Backend>,
    onboarding: ReadThrough<bool>,
    stories: ReadThrough<Vec<Story>>,
    feed: ReadThrough<Page<FeedItem, String>>,
    locations: TtlCache<String, Location>,
    location_requests: Coalescer<Option<Location>>,
    location_batcher: Batcher<String, Location>,
    location_policy: FetchPolicy,
    page_size: usize,
}

impl DomainFetchers {
    pub fn new(backend: Arc<dyn Backend>, config: &Config) -> Self {
        let batch_backend = Arc::clone(&backend);
        let location_batcher = Batcher::new(
            "locations",
            move |ids: Vec<String>| {
                let backend = Arc::clone(&batch_backend);
                async move { backend.locations(&ids).await.map_err(CoreError::fetch) }
            },
            config.batch_window,
        )
        .with_max_batch_size(config.batch_max_size);

        Self {
            backend,
            onboarding: ReadThrough::new("onboarding", config.max_entries, config.onboarding),
            stories: ReadThrough::new("stories", config.max_entries, config.stories),
            feed: ReadThrough::new("feed", config.max_entries, config.feed),
            locations: TtlCache::new("locations", config.max_entries, config.location.ttl),
            location_requests: Coalescer::new("locations", config.location.dedupe_window),
            location_batcher,
            location_policy: config.location,
            page_size: config.page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // == Onboarding ==
    /// Whether the user finished onboarding.
    ///
    /// Fails open: if the backend errors the user is assumed onboarded, so a
    /// flaky read never traps someone in the onboarding flow.
    pub async fn onboarding_status(&self, user_id: &str) -> Result<bool> {
        require_id("user", user_id)?;
        let backend = Arc::clone(&self.backend);
        let owned = user_id.to_string();

        let result = self
            .onboarding
            .fetch(onboarding_key(user_id), move || async move {
                backend
                    .onboarding_completed(&owned)
                    .await
                    .map_err(CoreError::fetch)
            })
            .await;

        Ok(result.unwrap_or_else(|err| {
            warn!(user_id, error = %err, "onboarding lookup failed, assuming completed");
            true
        }))
    }

    // == Stories ==
    /// Active stories for a user, or an empty list if the backend fails.
    pub async fn stories(&self, user_id: &str) -> Result<Vec<Story>> {
        require_id("user", user_id)?;
        let backend = Arc::clone(&self.backend);
        let owned = user_id.to_string();

        let result = self
            .stories
            .fetch(stories_key(user_id), move || async move {
                backend.stories(&owned).await.map_err(CoreError::fetch)
            })
            .await;

        Ok(result.unwrap_or_else(|err| {
            warn!(user_id, error = %err, "stories lookup failed, returning none");
            Vec::new()
        }))
    }

    // == Locations ==
    /// A single location by id; `None` if unknown or the backend fails.
    ///
    /// Misses go through the location batcher, so lookups issued close
    /// together reach the backend as one multi-id request.
    pub async fn location(&self, id: &str) -> Result<Option<Location>> {
        require_id("location", id)?;
        let key = location_key(id);

        if let Some(location) = self.locations.get(&key).await {
            debug!(id, "location cache hit");
            return Ok(Some(location));
        }

        let batcher = self.location_batcher.clone();
        let owned = id.to_string();
        let result = self
            .location_requests
            .coalesce_within(key.clone(), self.location_policy.dedupe_window, move || {
                async move { batcher.load(owned).await }
            })
            .await;

        match result {
            Ok(Some(location)) => {
                if let Err(err) = self
                    .locations
                    .set(key, location.clone(), Some(self.location_policy.ttl))
                    .await
                {
                    warn!(id, error = %err, "location not cached");
                }
                Ok(Some(location))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(id, error = %err, "location lookup failed");
                Ok(None)
            }
        }
    }

    /// Several locations at once, in input order.
    pub async fn locations(&self, ids: &[String]) -> Result<Vec<Option<Location>>> {
        for id in ids {
            require_id("location", id)?;
        }
        join_all(ids.iter().map(|id| self.location(id)))
            .await
            .into_iter()
            .collect()
    }

    // == Feed ==
    /// One feed page. Errors propagate so paginators can surface them.
    pub async fn feed_page(
        &self,
        cursor: Option<String>,
        page_size: usize,
    ) -> Result<Page<FeedItem, String>> {
        let backend = Arc::clone(&self.backend);
        let key = feed_key(cursor.as_deref(), page_size);

        self.feed
            .fetch(key, move || async move {
                backend
                    .feed_page(cursor.as_deref(), page_size)
                    .await
                    .map_err(CoreError::fetch)
            })
            .await
    }

    /// Infinite-scroll paginator over the feed.
    pub fn feed_paginator(&self, page_size: usize) -> CursorPaginator<FeedItem, String> {
        let fetchers = self.clone();
        CursorPaginator::new(
            move |cursor, page_size| {
                let fetchers = fetchers.clone();
                async move { fetchers.feed_page(cursor, page_size).await }
            },
            PaginatorOptions {
                page_size,
                enabled: true,
            },
        )
    }

    // == Invalidation ==
    /// Drops the user's onboarding and stories entries. Returns how many existed.
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        let onboarding = self.onboarding.invalidate(&onboarding_key(user_id)).await;
        let stories = self.stories.invalidate(&stories_key(user_id)).await;
        usize::from(onboarding) + usize::from(stories)
    }

    pub async fn invalidate_location(&self, id: &str) -> bool {
        let key = location_key(id);
        self.location_requests.forget(&key);
        self.locations.del(&key).await
    }

    /// Drops every cached feed page.
    pub async fn invalidate_feed(&self) -> usize {
        self.feed.coalescer.forget_all();
        self.feed.cache.del_where(|key| key.starts_with("feed:")).await
    }

    // == Maintenance ==
    /// Removes expired entries from every cache.
    pub async fn sweep_expired(&self) -> usize {
        self.onboarding.cache.cleanup_expired().await
            + self.stories.cache.cleanup_expired().await
            + self.feed.cache.cleanup_expired().await
            + self.locations.cleanup_expired().await
    }

    pub async fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.onboarding.cache.name(), self.onboarding.cache.stats().await),
            (self.stories.cache.name(), self.stories.cache.stats().await),
            (self.locations.name(), self.locations.stats().await),
            (self.feed.cache.name(), self.feed.cache.stats().await),
        ]
    }

    /// Requests currently recorded across all coalescers and the batcher.
    pub fn pending_requests(&self) -> usize {
        self.onboarding.coalescer.pending_len()
            + self.stories.coalescer.pending_len()
            + self.feed.coalescer.pending_len()
            + self.location_requests.pending_len()
            + self.location_batcher.pending_len()
    }

    /// Aborts all coalescer cleanup timers. Used at shutdown.
    pub fn shutdown(&self) {
        self.onboarding.coalescer.shutdown();
        self.stories.coalescer.shutdown();
        self.feed.coalescer.shutdown();
        self.location_requests.shutdown();
    }
}
