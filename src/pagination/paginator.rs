//! Cursor Paginator
//!
//! Wraps a paged query and accumulates its pages into one growing list.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::pagination::Page;

type QueryFn<T, C> = Arc<dyn Fn(Option<C>, usize) -> BoxFuture<'static, Result<Page<T, C>>> + Send + Sync>;

/// Where the paginator is in its load cycle.
///
/// ```text
/// Idle -> Loading -> Ready <-> FetchingNext
///            \          \          /
///             +-------> Error <---+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStatus {
    /// Nothing requested yet
    Idle,
    /// First page in flight
    Loading,
    /// Last request succeeded
    Ready,
    /// A follow-up page is in flight
    FetchingNext,
    /// Last request failed; loaded items are kept
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginatorOptions {
    pub page_size: usize,
    /// A disabled paginator never issues requests
    pub enabled: bool,
}

impl Default for PaginatorOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            enabled: true,
        }
    }
}

/// Point-in-time view of a paginator for consumers to render from.
#[derive(Debug, Clone)]
pub struct PaginationState<T, C> {
    pub items: Vec<T>,
    pub next_cursor: Option<C>,
    pub has_next_page: bool,
    pub status: PaginationStatus,
    pub error: Option<CoreError>,
    pub pages_loaded: usize,
}

impl<T, C> PaginationState<T, C> {
    fn initial() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_next_page: true,
            status: PaginationStatus::Idle,
            error: None,
            pages_loaded: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == PaginationStatus::Loading
    }

    pub fn is_fetching_next_page(&self) -> bool {
        self.status == PaginationStatus::FetchingNext
    }

    pub fn total_loaded(&self) -> usize {
        self.items.len()
    }

    fn in_flight(&self) -> bool {
        self.is_loading() || self.is_fetching_next_page()
    }
}

struct Inner<T, C> {
    state: PaginationState<T, C>,
    /// Bumped by `refetch`; results from older generations are dropped
    generation: u64,
}

// == Cursor Paginator ==
/// Infinite-scroll style pagination over `query_fn(cursor, page_size)`.
///
/// Items from every successful page are appended in order. Only one page
/// request runs at a time; extra `fetch_next_page` calls while one is in
/// flight are no-ops. A failed page keeps everything loaded so far and the
/// next call retries the same cursor.
///
/// Page requests run on their own task, so dropping the caller's future
/// never leaves the paginator stuck in a loading state.
pub struct CursorPaginator<T, C> {
    query_fn: QueryFn<T, C>,
    options: PaginatorOptions,
    inner: Arc<Mutex<Inner<T, C>>>,
}

impl<T, C> Clone for CursorPaginator<T, C> {
    fn clone(&self) -> Self {
        Self {
            query_fn: Arc::clone(&self.query_fn),
            options: self.options,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, C> CursorPaginator<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(query_fn: F, options: PaginatorOptions) -> Self
    where
        F: Fn(Option<C>, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T, C>>> + Send + 'static,
    {
        Self {
            query_fn: Arc::new(move |cursor, page_size| query_fn(cursor, page_size).boxed()),
            options,
            inner: Arc::new(Mutex::new(Inner {
                state: PaginationState::initial(),
                generation: 0,
            })),
        }
    }

    pub fn options(&self) -> PaginatorOptions {
        self.options
    }

    pub fn snapshot(&self) -> PaginationState<T, C> {
        self.lock().state.clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().state.items.clone()
    }

    pub fn status(&self) -> PaginationStatus {
        self.lock().state.status
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.is_loading()
    }

    pub fn is_fetching_next_page(&self) -> bool {
        self.lock().state.is_fetching_next_page()
    }

    pub fn has_next_page(&self) -> bool {
        self.lock().state.has_next_page
    }

    pub fn error(&self) -> Option<CoreError> {
        self.lock().state.error.clone()
    }

    pub fn total_loaded(&self) -> usize {
        self.lock().state.total_loaded()
    }

    /// Loads the first page if nothing has been requested yet.
    pub async fn fetch_first_page(&self) -> Result<bool> {
        if self.status() != PaginationStatus::Idle {
            return Ok(false);
        }
        self.fetch_next_page().await
    }

    // == Fetch Next Page ==
    /// Requests the page after the current cursor.
    ///
    /// Returns `Ok(false)` without fetching when disabled, when a page is
    /// already in flight, or when there are no more pages.
    pub async fn fetch_next_page(&self) -> Result<bool> {
        if !self.options.enabled {
            return Ok(false);
        }

        let (generation, cursor) = {
            let mut inner = self.lock();
            let state = &mut inner.state;
            if state.in_flight() || !state.has_next_page {
                return Ok(false);
            }
            state.status = if state.pages_loaded == 0 {
                PaginationStatus::Loading
            } else {
                PaginationStatus::FetchingNext
            };
            (inner.generation, inner.state.next_cursor.clone())
        };

        self.run(generation, cursor).await
    }

    // == Refetch ==
    /// Discards every loaded page and loads from the start again.
    ///
    /// A page request still in flight from before the refetch is ignored
    /// when it lands.
    pub async fn refetch(&self) -> Result<bool> {
        if !self.options.enabled {
            return Ok(false);
        }

        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = PaginationState::initial();
            inner.state.status = PaginationStatus::Loading;
            inner.generation
        };
        debug!(generation, "paginator refetching from first page");

        self.run(generation, None).await
    }

    async fn run(&self, generation: u64, cursor: Option<C>) -> Result<bool> {
        let query = (self.query_fn)(cursor, self.options.page_size);
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(query)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(CoreError::TaskFailed("page query panicked".into())));
            apply(&inner, generation, result)
        });

        match task.await {
            Ok(result) => result,
            Err(err) => Err(CoreError::TaskFailed(err.to_string())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Folds a page result into the state unless a refetch superseded it.
fn apply<T, C>(
    inner: &Mutex<Inner<T, C>>,
    generation: u64,
    result: Result<Page<T, C>>,
) -> Result<bool> {
    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.generation != generation {
        debug!(generation, "dropping page from superseded load");
        return result.map(|_| false);
    }

    let state = &mut inner.state;
    match result {
        Ok(page) => {
            state.has_next_page = page.can_continue();
            state.next_cursor = page.next_cursor;
            state.items.extend(page.data);
            state.pages_loaded += 1;
            state.status = PaginationStatus::Ready;
            state.error = None;
            Ok(true)
        }
        Err(err) => {
            warn!(error = %err, pages_loaded = state.pages_loaded, "page fetch failed");
            state.status = PaginationStatus::Error;
            state.error = Some(err.clone());
            Err(err)
        }
    }
}
