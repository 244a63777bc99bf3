//! Request DTOs for the gateway API
//!
//! Query-string shapes for the read endpoints.

use serde::Deserialize;

/// Largest page a client may request from `/feed`.
pub const MAX_PAGE_SIZE: usize = 100;

/// Largest id list accepted by `/locations`.
pub const MAX_LOCATION_IDS: usize = 200;

/// Query for GET /feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    /// Opaque cursor from the previous page
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size (server default if omitted)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FeedQuery {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match self.limit {
            Some(0) => Some("limit must be at least 1".to_string()),
            Some(limit) if limit > MAX_PAGE_SIZE => {
                Some(format!("limit exceeds maximum of {}", MAX_PAGE_SIZE))
            }
            _ => None,
        }
    }

    /// Empty cursors are treated as "start from the beginning".
    pub fn cursor(&self) -> Option<String> {
        self.cursor.clone().filter(|c| !c.is_empty())
    }
}

/// Query for GET /locations
#[derive(Debug, Clone, Deserialize)]
pub struct LocationsQuery {
    /// Comma-separated location ids
    pub ids: String,
}

impl LocationsQuery {
    /// Splits the id list, dropping blanks.
    pub fn ids(&self) -> Vec<String> {
        self.ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn validate(&self) -> Option<String> {
        let count = self.ids().len();
        if count == 0 {
            return Some("ids cannot be empty".to_string());
        }
        if count > MAX_LOCATION_IDS {
            return Some(format!("at most {} ids per request", MAX_LOCATION_IDS));
        }
        None
    }
}
