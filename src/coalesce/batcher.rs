//! Batcher
//!
//! Gathers single-key loads issued within a short window into one multi-key
//! fetch.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(50);

type BatchFn<K, V> = Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, Result<HashMap<K, V>>> + Send + Sync>;
type Waiter<V> = oneshot::Sender<Result<Option<V>>>;

struct BatchState<K, V> {
    /// Keys in arrival order, duplicates included
    pending_keys: Vec<K>,
    waiters: HashMap<K, Vec<Waiter<V>>>,
    /// Set while a window is open
    flush: Option<JoinHandle<()>>,
}

impl<K, V> BatchState<K, V> {
    fn take(&mut self) -> (Vec<K>, HashMap<K, Vec<Waiter<V>>>) {
        self.flush = None;
        (
            mem::take(&mut self.pending_keys),
            mem::take(&mut self.waiters),
        )
    }
}

// == Batcher ==
/// Merges `load` calls made within `window` into a single `batch_fn` call.
///
/// Every caller of the same key in a window receives the same value. A key
/// missing from the batch result resolves to `None`. If `batch_fn` fails,
/// every caller in that flush receives the same error.
pub struct Batcher<K, V> {
    name: &'static str,
    window: Duration,
    max_batch_size: usize,
    batch_fn: BatchFn<K, V>,
    state: Arc<Mutex<BatchState<K, V>>>,
}

impl<K, V> Clone for Batcher<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            window: self.window,
            max_batch_size: self.max_batch_size,
            batch_fn: Arc::clone(&self.batch_fn),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> Batcher<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: &'static str, batch_fn: F, window: Duration) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>>> + Send + 'static,
    {
        Self {
            name,
            window,
            max_batch_size: 0,
            batch_fn: Arc::new(move |keys| batch_fn(keys).boxed()),
            state: Arc::new(Mutex::new(BatchState {
                pending_keys: Vec::new(),
                waiters: HashMap::new(),
                flush: None,
            })),
        }
    }

    /// Flushes as soon as this many distinct keys are waiting. 0 disables the cap.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // == Load ==
    /// Queues `key` for the current window and waits for the batch result.
    pub async fn load(&self, key: K) -> Result<Option<V>> {
        let receiver = self.enqueue(key);
        receiver.await.unwrap_or(Err(CoreError::BatchDropped))
    }

    // == Load Many ==
    /// Queues every key in the same window and returns results in input order.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<Option<V>>> {
        let receivers: Vec<_> = keys.into_iter().map(|key| self.enqueue(key)).collect();
        join_all(receivers)
            .await
            .into_iter()
            .map(|received| received.unwrap_or(Err(CoreError::BatchDropped)))
            .collect()
    }

    /// Number of distinct keys waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        lock(&self.state).waiters.len()
    }

    fn enqueue(&self, key: K) -> oneshot::Receiver<Result<Option<V>>> {
        let (sender, receiver) = oneshot::channel();
        let mut state = lock(&self.state);

        state.pending_keys.push(key.clone());
        state.waiters.entry(key).or_default().push(sender);

        if self.max_batch_size > 0 && state.waiters.len() >= self.max_batch_size {
            if let Some(timer) = state.flush.take() {
                timer.abort();
            }
            let (keys, waiters) = state.take();
            tokio::spawn(run_batch(self.name, Arc::clone(&self.batch_fn), keys, waiters));
        } else if state.flush.is_none() {
            let shared_state = Arc::clone(&self.state);
            let batch_fn = Arc::clone(&self.batch_fn);
            let window = self.window;
            let name = self.name;
            state.flush = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                let (keys, waiters) = lock(&shared_state).take();
                run_batch(name, batch_fn, keys, waiters).await;
            }));
        }

        receiver
    }
}

/// Runs one flush and answers every waiter.
async fn run_batch<K, V>(
    name: &'static str,
    batch_fn: BatchFn<K, V>,
    keys: Vec<K>,
    waiters: HashMap<K, Vec<Waiter<V>>>,
) where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    if waiters.is_empty() {
        return;
    }

    let mut seen = HashSet::with_capacity(keys.len());
    let unique: Vec<K> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
    debug!(batcher = name, keys = unique.len(), "flushing batch");

    match batch_fn(unique).await {
        Ok(results) => {
            for (key, senders) in waiters {
                let value = results.get(&key).cloned();
                for sender in senders {
                    let _ = sender.send(Ok(value.clone()));
                }
            }
        }
        Err(err) => {
            warn!(batcher = name, error = %err, "batch load failed");
            for sender in waiters.into_values().flatten() {
                let _ = sender.send(Err(err.clone()));
            }
        }
    }
}

fn lock<K, V>(state: &Mutex<BatchState<K, V>>) -> MutexGuard<'_, BatchState<K, V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
