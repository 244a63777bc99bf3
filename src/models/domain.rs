//! Domain records served by the read path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short-lived story posted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub media_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Story {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A place that can be shared or reviewed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: Option<String>,
}

/// One post in the discovery feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub author_id: String,
    pub body: String,
    #[serde(default)]
    pub location_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
