//! Scroll Trigger
//!
//! Decides when a scroll position is close enough to the bottom to load the
//! next page.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::pagination::CursorPaginator;

/// Distance from the bottom, in pixels, that triggers a load by default.
pub const DEFAULT_SCROLL_THRESHOLD: f64 = 200.0;

/// Scroll metrics of a container, as reported by the view layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollPosition {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

// == Scroll Trigger ==
/// Fires a load when the remaining scroll distance drops below `threshold`.
///
/// Scroll events arrive in bursts; the internal latch lets only one of them
/// through until [`ScrollTrigger::finish`] is called, even before the
/// consumer's own loading flag has flipped.
#[derive(Debug)]
pub struct ScrollTrigger {
    threshold: f64,
    latched: AtomicBool,
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_THRESHOLD)
    }
}

impl ScrollTrigger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            latched: AtomicBool::new(false),
        }
    }

    /// Returns true exactly once per burst when a load should start.
    pub fn should_load(&self, position: ScrollPosition, has_more: bool, is_loading: bool) -> bool {
        if !has_more || is_loading || position.distance_from_bottom() >= self.threshold {
            return false;
        }
        self.latched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the latch once the triggered load has finished.
    pub fn finish(&self) {
        self.latched.store(false, Ordering::Release);
    }

    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    // == On Scroll ==
    /// Feeds a scroll event to `paginator`, loading the next page if needed.
    ///
    /// Returns whether a page was fetched.
    pub async fn on_scroll<T, C>(
        &self,
        position: ScrollPosition,
        paginator: &CursorPaginator<T, C>,
    ) -> Result<bool>
    where
        T: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
    {
        let state = paginator.snapshot();
        let busy = state.is_loading() || state.is_fetching_next_page();
        if !self.should_load(position, state.has_next_page, busy) {
            return Ok(false);
        }

        let _release = Release(&self.latched);
        paginator.fetch_next_page().await
    }
}

/// Clears the latch on drop, so a cancelled load doesn't block future ones.
struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
