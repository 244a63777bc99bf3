//! Request Coalescer
//!
//! Collapses concurrent reads of the same key onto one underlying fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{CoreError, Result};

/// Window used by [`Coalescer::coalesce`] unless configured otherwise.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_millis(100);

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T>>>;

/// An in-flight (or recently settled) fetch that callers can join.
struct PendingRequest<T> {
    future: SharedFetch<T>,
    started_at: Instant,
    generation: u64,
}

struct CoalescerState<T> {
    pending: HashMap<String, PendingRequest<T>>,
    /// Removal timers, one per started fetch
    cleanups: JoinSet<()>,
    next_generation: u64,
}

// == Coalescer ==
/// Deduplicates concurrent calls that share a key.
///
/// The first call for a key runs the fetcher on its own task and records the
/// shared result. Calls arriving less than `dedupe_window` after that first
/// call started join it instead of fetching again. The record is dropped
/// `dedupe_window` after the fetch settles, unless a newer fetch has already
/// replaced it (checked by generation number).
///
/// The window is measured from when the request *started*. A fetch slower
/// than the window can therefore be overlapped by a second fetch for the
/// same key.
///
/// Fetches run to completion even if every caller stops waiting. Dropping
/// the last handle or calling [`Coalescer::shutdown`] aborts pending removal
/// timers.
pub struct Coalescer<T> {
    name: &'static str,
    default_window: Duration,
    state: Arc<Mutex<CoalescerState<T>>>,
}

impl<T> Clone for Coalescer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            default_window: self.default_window,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, default_window: Duration) -> Self {
        Self {
            name,
            default_window,
            state: Arc::new(Mutex::new(CoalescerState {
                pending: HashMap::new(),
                cleanups: JoinSet::new(),
                next_generation: 0,
            })),
        }
    }

    pub fn default_window(&self) -> Duration {
        self.default_window
    }

    /// Coalesces using the default dedupe window.
    pub async fn coalesce<F, Fut>(&self, key: impl Into<String>, fetcher: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.coalesce_within(key, self.default_window, fetcher).await
    }

    // == Coalesce ==
    /// Joins a fresh in-flight request for `key` or starts a new one.
    ///
    /// Every caller that joins the same request receives a clone of the same
    /// value or the same error.
    ///
    /// `fetcher` is called before the coalescer's lock is taken, so it may use
    /// this coalescer. When the call joins an existing request the future it
    /// returned is dropped without being polled.
    pub async fn coalesce_within<F, Fut>(
        &self,
        key: impl Into<String>,
        window: Duration,
        fetcher: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = key.into();
        let fetch = fetcher();
        let shared = {
            let mut state = lock(&self.state);
            let now = Instant::now();

            let joined = state
                .pending
                .get(&key)
                .filter(|entry| now.duration_since(entry.started_at) < window)
                .map(|entry| entry.future.clone());

            match joined {
                Some(future) => {
                    debug!(coalescer = self.name, %key, "joining in-flight request");
                    drop(fetch);
                    future
                }
                None => self.start(&mut state, key, window, now, fetch),
            }
        };

        shared.await
    }

    /// Spawns the fetch and registers it before any caller can observe it settle.
    fn start<Fut>(
        &self,
        state: &mut CoalescerState<T>,
        key: String,
        window: Duration,
        now: Instant,
        fetch: Fut,
    ) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let generation = state.next_generation;
        state.next_generation += 1;
        debug!(coalescer = self.name, %key, generation, "starting fetch");

        let task = tokio::spawn(fetch);
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(CoreError::TaskFailed(err.to_string())),
            }
        }
        .boxed()
        .shared();

        state.pending.insert(
            key.clone(),
            PendingRequest {
                future: future.clone(),
                started_at: now,
                generation,
            },
        );

        // Reap finished timers so the set doesn't grow without bound
        while state.cleanups.try_join_next().is_some() {}

        let settled = future.clone();
        let weak: Weak<Mutex<CoalescerState<T>>> = Arc::downgrade(&self.state);
        let name = self.name;
        state.cleanups.spawn(async move {
            let _ = settled.await;
            tokio::time::sleep(window).await;

            if let Some(state) = weak.upgrade() {
                let mut state = lock(&state);
                let current = state
                    .pending
                    .get(&key)
                    .is_some_and(|entry| entry.generation == generation);
                if current {
                    state.pending.remove(&key);
                    trace!(coalescer = name, %key, generation, "pending request released");
                }
            }
        });

        future
    }

    /// Number of keys with a recorded request.
    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.state).pending.contains_key(key)
    }

    /// Forgets a key so the next call fetches fresh. Does not cancel the fetch.
    pub fn forget(&self, key: &str) -> bool {
        lock(&self.state).pending.remove(key).is_some()
    }

    /// Forgets every key. Fetches and removal timers keep running; a timer
    /// finding its key replaced or gone does nothing.
    pub fn forget_all(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    // == Shutdown ==
    /// Aborts every pending removal timer and drops all recorded requests.
    ///
    /// Callers already awaiting a fetch still receive its result.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.cleanups.abort_all();
        let dropped = state.pending.len();
        state.pending.clear();
        debug!(coalescer = self.name, dropped, "coalescer shut down");
    }
}

fn lock<T>(state: &Mutex<CoalescerState<T>>) -> MutexGuard<'_, CoalescerState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    fn counting<T: Clone + Send + 'static>(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: T,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<T>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, Result<u32>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(CoreError::fetch(anyhow::anyhow!("backend unavailable")))
            }
            .boxed()
        }
    }

    async fn exploding_fetch() -> Result<u32> {
        panic!("fetcher exploded")
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_calls_share_one_fetch() {
        let coalescer: Coalescer<Arc<User>> = Coalescer::new("users", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));
        let user = Arc::new(User {
            id: 1,
            name: "Ada".into(),
        });

        let results = join_all((0..5).map(|_| {
            coalescer.coalesce(
                "user:1",
                counting(&calls, Duration::from_millis(20), Arc::clone(&user)),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(first.id, 1);
        assert_eq!(first.name, "Ada");
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_after_window_fetches_again() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = coalescer
            .coalesce("k", counting(&calls, Duration::from_millis(10), 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = coalescer
            .coalesce("k", counting(&calls, Duration::from_millis(10), 2))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_share() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coalescer.coalesce("a", counting(&calls, Duration::from_millis(10), 1)),
            coalescer.coalesce("b", counting(&calls, Duration::from_millis(10), 2)),
        );

        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_reaches_every_joined_caller() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..3).map(|_| coalescer.coalesce("k", failing(&calls)))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap_err();
        for result in &results {
            assert!(first.same_failure(result.as_ref().unwrap_err()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entry_is_cleaned_up_and_retried() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(coalescer.coalesce("k", failing(&calls)).await.is_err());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!coalescer.is_pending("k"));

        let value = coalescer
            .coalesce("k", counting(&calls, Duration::from_millis(10), 7))
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_overlapped_after_window() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = tokio::spawn({
            let coalescer = coalescer.clone();
            let fetch = counting(&calls, Duration::from_millis(500), 1);
            async move { coalescer.coalesce("slow", fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Window measured from start has passed while the first is still in flight
        let second = tokio::spawn({
            let coalescer = coalescer.clone();
            let fetch = counting(&calls, Duration::from_millis(500), 2);
            async move { coalescer.coalesce("slow", fetch).await }
        });

        assert_eq!(first.await.unwrap().unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;

        // First request's removal timer must not drop the newer entry
        assert!(coalescer.is_pending("slow"));
        assert_eq!(second.await.unwrap().unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!coalescer.is_pending("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_completes_when_caller_is_dropped() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let fetch = {
            let finished = Arc::clone(&finished);
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(3)
            }
        };

        let caller = tokio::spawn({
            let coalescer = coalescer.clone();
            async move { coalescer.coalesce("k", fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_reports_task_failure() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_millis(100));

        let result = coalescer.coalesce("k", exploding_fetch).await;

        assert!(matches!(result, Err(CoreError::TaskFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_pending_requests() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        coalescer
            .coalesce("a", counting(&calls, Duration::from_millis(1), 1))
            .await
            .unwrap();
        coalescer
            .coalesce("b", counting(&calls, Duration::from_millis(1), 2))
            .await
            .unwrap();
        assert_eq!(coalescer.pending_len(), 2);

        coalescer.shutdown();

        assert_eq!(coalescer.pending_len(), 0);
        coalescer
            .coalesce("a", counting(&calls, Duration::from_millis(1), 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_all_forces_new_fetches_and_keeps_cleanup() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            coalescer
                .coalesce(key, counting(&calls, Duration::from_millis(1), 1))
                .await
                .unwrap();
        }
        assert_eq!(coalescer.forget_all(), 2);
        assert_eq!(coalescer.pending_len(), 0);

        coalescer
            .coalesce("a", counting(&calls, Duration::from_millis(1), 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(coalescer.is_pending("a"));

        // The fresh request is still released after its window
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetcher_may_use_its_own_coalescer() {
        let coalescer: Coalescer<bool> = Coalescer::new("test", Duration::from_millis(100));
        let inner = coalescer.clone();

        let was_pending = coalescer
            .coalesce("k", move || {
                let pending = inner.is_pending("k");
                async move { Ok(pending) }
            })
            .await
            .unwrap();

        assert!(!was_pending);
        assert!(coalescer.is_pending("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_forces_new_fetch() {
        let coalescer: Coalescer<u32> = Coalescer::new("test", Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        coalescer
            .coalesce("k", counting(&calls, Duration::from_millis(1), 1))
            .await
            .unwrap();
        assert!(coalescer.forget("k"));
        coalescer
            .coalesce("k", counting(&calls, Duration::from_millis(1), 1))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
