use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, TmdbError};

pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Semantic identity of a query: resource name plus its significant
/// parameters, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: &'static str,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, value: impl ToString) -> Self {
        self.params.push(value.to_string());
        self
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource, self.params.join(","))
    }
}

/// How long a result stays fresh, how long an unobserved entry is kept, and
/// how failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl QueryPolicy {
    pub const fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
            retries: 1,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// What an observer sees for one key.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub is_loading: bool,
    pub error: Option<TmdbError>,
    pub updated_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            updated_at: None,
        }
    }
}

impl<T> QueryState<T> {
    /// Neither loading, errored nor holding data. Disabled queries stay here.
    pub fn is_idle(&self) -> bool {
        self.data.is_none() && !self.is_loading && self.error.is_none()
    }
}

struct Entry<T> {
    tx: watch::Sender<QueryState<T>>,
    fetcher: Fetcher<T>,
    policy: QueryPolicy,
    fetched_at: Option<Instant>,
    generation: u64,
    in_flight: Option<AbortHandle>,
    observers: usize,
    unobserved_since: Option<Instant>,
}

impl<T> Entry<T> {
    fn new(fetcher: Fetcher<T>, policy: QueryPolicy, now: Instant) -> Self {
        let (tx, _) = watch::channel(QueryState::default());
        Self {
            tx,
            fetcher,
            policy,
            fetched_at: None,
            generation: 0,
            in_flight: None,
            observers: 0,
            unobserved_since: Some(now),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        let errored = self.tx.borrow().error.is_some();
        match self.fetched_at {
            Some(at) if !errored => now.duration_since(at) < self.policy.stale_time,
            _ => false,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && self
                .unobserved_since
                .is_some_and(|since| now.duration_since(since) >= self.policy.gc_time)
    }
}

struct Shared<T> {
    entries: Mutex<HashMap<QueryKey, Entry<T>>>,
}

impl<T> Shared<T> {
    // No await happens under this lock, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache of query results of one value type, keyed by [`QueryKey`].
///
/// Requests for a key already being fetched join that fetch instead of
/// starting another. Fresh entries are served without a fetch; stale ones
/// are served immediately and refreshed in the background. Requesting a
/// key spawns onto the current Tokio runtime, so it must be called from
/// within one.
pub struct QueryCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T> fmt::Debug for QueryCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.shared.lock().len())
            .finish()
    }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `key`, fetching with `fetch` when the entry is absent or
    /// stale. The most recent `fetch` closure for a key is the one used for
    /// later refetches.
    pub fn query<F, Fut>(&self, key: QueryKey, policy: QueryPolicy, fetch: F) -> QueryHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetcher: Fetcher<T> = Arc::new(move || Box::pin(fetch()) as FetchFuture<T>);
        let now = Instant::now();

        let mut entries = self.shared.lock();
        evict_expired(&mut entries, now);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Arc::clone(&fetcher), policy, now));
        entry.fetcher = fetcher;
        entry.policy = policy;
        entry.observers += 1;
        entry.unobserved_since = None;
        let rx = entry.tx.subscribe();

        if entry.in_flight.is_some() {
            debug!(key = %key, "joining in-flight query");
        } else if entry.is_fresh(now) {
            debug!(key = %key, "serving fresh query from cache");
        } else {
            self.start_fetch(&key, entry);
        }
        drop(entries);

        QueryHandle {
            rx,
            observer: Some(Observer {
                cache: self.clone(),
                key,
            }),
        }
    }

    /// Drop every unobserved entry whose retention window has elapsed.
    /// Also happens lazily on each [`QueryCache::query`].
    pub fn collect_garbage(&self) -> usize {
        let mut entries = self.shared.lock();
        evict_expired(&mut entries, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.shared.lock().contains_key(key)
    }

    // Caller holds the lock. Supersedes any fetch already running for the
    // key: only the newest generation may write its result.
    fn start_fetch(&self, key: &QueryKey, entry: &mut Entry<T>) {
        if let Some(previous) = entry.in_flight.take() {
            previous.abort();
        }
        entry.generation += 1;
        let generation = entry.generation;
        entry.tx.send_modify(|state| state.is_loading = true);
        debug!(key = %key, generation, "fetching query");

        let fetcher = Arc::clone(&entry.fetcher);
        let policy = entry.policy;
        let cache = self.clone();
        let key = key.clone();
        let task = tokio::spawn(async move {
            let result = fetch_with_retry(&fetcher, policy, &key).await;
            cache.complete(&key, generation, result);
        });
        entry.in_flight = Some(task.abort_handle());
    }

    fn complete(&self, key: &QueryKey, generation: u64, result: Result<T>) {
        let now = Instant::now();
        let mut entries = self.shared.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.generation != generation {
            debug!(key = %key, generation, "discarding superseded query result");
            return;
        }
        entry.in_flight = None;
        match result {
            Ok(value) => {
                entry.fetched_at = Some(now);
                entry.tx.send_modify(|state| {
                    state.data = Some(Arc::new(value));
                    state.error = None;
                    state.is_loading = false;
                    state.updated_at = Some(now);
                });
            }
            Err(err) => {
                warn!(key = %key, error = %err, "query failed");
                entry.tx.send_modify(|state| {
                    state.error = Some(err);
                    state.is_loading = false;
                });
            }
        }
    }

    fn refetch(&self, key: &QueryKey) {
        let mut entries = self.shared.lock();
        if let Some(entry) = entries.get_mut(key) {
            self.start_fetch(key, entry);
        }
    }

    fn release(&self, key: &QueryKey) {
        let mut entries = self.shared.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers == 0 {
                entry.unobserved_since = Some(Instant::now());
            }
        }
    }
}

fn evict_expired<T>(entries: &mut HashMap<QueryKey, Entry<T>>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|key, entry| {
        let keep = !entry.is_expired(now);
        if !keep {
            debug!(key = %key, "evicting unobserved query");
        }
        keep
    });
    before - entries.len()
}

async fn fetch_with_retry<T>(
    fetcher: &Fetcher<T>,
    policy: QueryPolicy,
    key: &QueryKey,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.retries => {
                attempt += 1;
                warn!(key = %key, attempt, error = %err, "retrying query");
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

struct Observer<T: Send + Sync + 'static> {
    cache: QueryCache<T>,
    key: QueryKey,
}

impl<T: Send + Sync + 'static> Drop for Observer<T> {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

/// One observer's view of a query. Dropping it unsubscribes; a result that
/// lands afterwards is never delivered to it.
pub struct QueryHandle<T: Send + Sync + 'static> {
    rx: watch::Receiver<QueryState<T>>,
    observer: Option<Observer<T>>,
}

impl<T: Send + Sync + 'static> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.rx.borrow();
        f.debug_struct("QueryHandle")
            .field("key", &self.observer.as_ref().map(|o| o.key.to_string()))
            .field("has_data", &state.data.is_some())
            .field("is_loading", &state.is_loading)
            .field("error", &state.error)
            .finish()
    }
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    /// A query that never runs: no data, not loading, no error.
    pub fn disabled() -> Self {
        let (_, rx) = watch::channel(QueryState::default());
        Self { rx, observer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some()
    }

    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. `false` once no more can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the query is no longer loading and return that state.
    pub async fn settled(&mut self) -> QueryState<T> {
        if let Ok(state) = self.rx.wait_for(|s| !s.is_loading).await {
            return state.clone();
        }
        self.rx.borrow().clone()
    }

    /// Fetch again now, even if fresh. A fetch already running for the key
    /// is superseded and its result discarded.
    pub fn refetch(&self) {
        if let Some(observer) = &self.observer {
            observer.cache.refetch(&observer.key);
        }
    }
}
