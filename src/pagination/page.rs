//! Page Model
//!
//! One page of results returned by a cursor-based query.

use serde::{Deserialize, Serialize};

// == Page ==
/// A single page of items plus the cursor for the page after it.
///
/// The cursor is opaque to the paginator; only the query function that
/// produced it interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T, C> {
    pub data: Vec<T>,
    pub next_cursor: Option<C>,
    pub has_more: bool,
}

impl<T, C> Page<T, C> {
    pub fn new(data: Vec<T>, next_cursor: Option<C>, has_more: bool) -> Self {
        Self {
            data,
            next_cursor,
            has_more,
        }
    }

    /// The final page: no cursor, nothing more to load.
    pub fn last(data: Vec<T>) -> Self {
        Self::new(data, None, false)
    }

    /// True when another page can actually be requested.
    pub fn can_continue(&self) -> bool {
        self.has_more && self.next_cursor.is_some()
    }
}
