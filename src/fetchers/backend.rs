//! Backend seam
//!
//! The external data platform the read path sits in front of.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{FeedItem, Location, Story};
use crate::pagination::Page;

/// Source of truth for every domain fetcher.
///
/// Implementations talk to the real platform (REST, database client, ...).
/// Not-found is expressed through empty collections or missing map keys,
/// never through an error.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Whether the user has finished onboarding.
    async fn onboarding_completed(&self, user_id: &str) -> anyhow::Result<bool>;

    /// Active stories posted by the user.
    async fn stories(&self, user_id: &str) -> anyhow::Result<Vec<Story>>;

    /// Locations for the given ids; unknown ids are simply absent.
    async fn locations(&self, ids: &[String]) -> anyhow::Result<HashMap<String, Location>>;

    /// One page of the discovery feed starting at `cursor`.
    async fn feed_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> anyhow::Result<Page<FeedItem, String>>;
}
