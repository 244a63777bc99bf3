//! Pagination Module
//!
//! Cursor-based infinite pagination and its scroll trigger.

mod page;
mod paginator;
mod scroll;

pub use page::Page;
pub use paginator::{CursorPaginator, PaginationState, PaginationStatus, PaginatorOptions};
pub use scroll::{ScrollPosition, ScrollTrigger, DEFAULT_SCROLL_THRESHOLD};
