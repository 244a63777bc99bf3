//! In-memory backend
//!
//! Seeded stand-in for the data platform, used by the gateway binary and
//! the tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::fetchers::Backend;
use crate::models::{FeedItem, Location, Story};
use crate::pagination::Page;

/// Initial data set, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    /// Users who finished onboarding
    #[serde(default)]
    pub onboarded: Vec<String>,
    #[serde(default)]
    pub stories: Vec<Story>,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Feed items, newest first
    #[serde(default)]
    pub feed: Vec<FeedItem>,
}

/// How many times each backend operation was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendCalls {
    pub onboarding: u64,
    pub stories: u64,
    pub locations: u64,
    pub feed: u64,
}

#[derive(Default)]
struct Counters {
    onboarding: AtomicU64,
    stories: AtomicU64,
    locations: AtomicU64,
    feed: AtomicU64,
}

struct Data {
    onboarded: HashSet<String>,
    stories: Vec<Story>,
    locations: HashMap<String, Location>,
    feed: Vec<FeedItem>,
}

// == In-Memory Backend ==
pub struct InMemoryBackend {
    data: RwLock<Data>,
    counters: Counters,
    failing: AtomicBool,
    latency: Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::from_seed(Seed::default())
    }
}

impl InMemoryBackend {
    pub fn from_seed(seed: Seed) -> Self {
        Self {
            data: RwLock::new(Data {
                onboarded: seed.onboarded.into_iter().collect(),
                stories: seed.stories,
                locations: seed
                    .locations
                    .into_iter()
                    .map(|location| (location.id.clone(), location))
                    .collect(),
                feed: seed.feed,
            }),
            counters: Counters::default(),
            failing: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    /// Loads a JSON seed file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: Seed = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        info!(
            "Seed loaded: {} onboarded users, {} stories, {} locations, {} feed items",
            seed.onboarded.len(),
            seed.stories.len(),
            seed.locations.len(),
            seed.feed.len()
        );
        Ok(Self::from_seed(seed))
    }

    /// Adds artificial delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every subsequent call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> BackendCalls {
        BackendCalls {
            onboarding: self.counters.onboarding.load(Ordering::SeqCst),
            stories: self.counters.stories.load(Ordering::SeqCst),
            locations: self.counters.locations.load(Ordering::SeqCst),
            feed: self.counters.feed.load(Ordering::SeqCst),
        }
    }

    pub async fn set_onboarded(&self, user_id: &str, completed: bool) {
        let mut data = self.data.write().await;
        if completed {
            data.onboarded.insert(user_id.to_string());
        } else {
            data.onboarded.remove(user_id);
        }
    }

    pub async fn add_story(&self, story: Story) {
        self.data.write().await.stories.push(story);
    }

    async fn enter(&self, counter: &AtomicU64) -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn onboarding_completed(&self, user_id: &str) -> anyhow::Result<bool> {
        self.enter(&self.counters.onboarding).await?;
        Ok(self.data.read().await.onboarded.contains(user_id))
    }

    async fn stories(&self, user_id: &str) -> anyhow::Result<Vec<Story>> {
        self.enter(&self.counters.stories).await?;
        let now = Utc::now();
        Ok(self
            .data
            .read()
            .await
            .stories
            .iter()
            .filter(|story| story.user_id == user_id && story.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn locations(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Location>> {
        self.enter(&self.counters.locations).await?;
        let data = self.data.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.locations.get(id).map(|l| (id.clone(), l.clone())))
            .collect())
    }

    async fn feed_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> anyhow::Result<Page<FeedItem, String>> {
        self.enter(&self.counters.feed).await?;
        let start = match cursor {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| anyhow!("invalid feed cursor: {raw}"))?,
            None => 0,
        };

        let data = self.data.read().await;
        let start = start.min(data.feed.len());
        let end = (start + page_size.max(1)).min(data.feed.len());
        let has_more = end < data.feed.len();

        Ok(Page::new(
            data.feed[start..end].to_vec(),
            has_more.then(|| end.to_string()),
            has_more,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_item(n: usize) -> FeedItem {
        FeedItem {
            id: format!("post-{n}"),
            author_id: "u1".into(),
            body: format!("post number {n}"),
            location_id: None,
            created_at: Utc::now(),
        }
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::from_seed(Seed {
            onboarded: vec!["u1".into()],
            stories: vec![],
            locations: vec![Location {
                id: "l1".into(),
                name: "Porto".into(),
                latitude: 41.15,
                longitude: -8.61,
                country: Some("PT".into()),
            }],
            feed: (0..5).map(feed_item).collect(),
        })
    }

    #[tokio::test]
    async fn test_onboarding_lookup() {
        let backend = backend();
        assert!(backend.onboarding_completed("u1").await.unwrap());
        assert!(!backend.onboarding_completed("u2").await.unwrap());

        backend.set_onboarded("u2", true).await;
        assert!(backend.onboarding_completed("u2").await.unwrap());
        assert_eq!(backend.calls().onboarding, 3);
    }

    #[tokio::test]
    async fn test_locations_skip_unknown_ids() {
        let backend = backend();
        let found = backend
            .locations(&["l1".to_string(), "nope".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found["l1"].name, "Porto");
    }

    #[tokio::test]
    async fn test_feed_pages_with_offset_cursor() {
        let backend = backend();

        let first = backend.feed_page(None, 2).await.unwrap();
        assert_eq!(first.data.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));
        assert!(first.has_more);

        let last = backend.feed_page(Some("4"), 2).await.unwrap();
        assert_eq!(last.data[0].id, "post-4");
        assert!(!last.has_more);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_invalid_cursor_is_an_error() {
        let backend = backend();
        assert!(backend.feed_page(Some("abc"), 2).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let backend = backend();
        backend.set_failing(true);
        assert!(backend.stories("u1").await.is_err());

        backend.set_failing(false);
        assert!(backend.stories("u1").await.unwrap().is_empty());
    }
}
