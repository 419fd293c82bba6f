//! Keyed async fetch cache with observer-driven lifecycle.
//!
//! DESIGN
//! ======
//! One `Entry` per `QueryKey` holds a `watch` sender with the current
//! `QueryState`, the fetch function, the number of mounted observers and the
//! handle of the in-flight fetch task. Observers hold a `watch` receiver and
//! unmount on drop.
//!
//! Mount and focus revalidation join an in-flight fetch. Explicit refetch
//! and invalidation abort it and start over. Every fetch carries a sequence
//! number; a result whose sequence is no longer current, or that lands
//! after the last observer unmounted, is discarded.
//!
//! Tasks are spawned on the runtime the cache was created in, so triggers
//! may fire from any thread. An entry left with no observers is evicted
//! after `gc_time` unless something mounts it again first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::focus::{FocusManager, Revalidate};
use super::key::QueryKey;
use super::state::{FetchTrigger, QueryOptions, QueryState};
use crate::net::types::ApiError;

/// The fetch function behind a query key.
#[async_trait::async_trait]
pub trait QueryFn<T>: Send + Sync {
    /// Read the current remote value.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the remote read fails.
    async fn fetch(&self) -> Result<T, ApiError>;
}

struct Entry<T> {
    tx: watch::Sender<QueryState<T>>,
    fetcher: Arc<dyn QueryFn<T>>,
    observers: usize,
    task: Option<JoinHandle<()>>,
    gc_task: Option<JoinHandle<()>>,
    fetch_seq: u64,
}

impl<T> Entry<T> {
    fn new(fetcher: Arc<dyn QueryFn<T>>) -> Self {
        let (tx, _rx) = watch::channel(QueryState::default());
        Self { tx, fetcher, observers: 0, task: None, gc_task: None, fetch_seq: 0 }
    }

    fn cancel_in_flight(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        task.abort();
        self.fetch_seq += 1;
        true
    }

    fn cancel_gc(&mut self) {
        if let Some(gc) = self.gc_task.take() {
            gc.abort();
        }
    }
}

struct Shared<T> {
    name: &'static str,
    handle: Handle,
    options: QueryOptions,
    entries: Mutex<HashMap<QueryKey, Entry<T>>>,
}

/// Cache of queries producing `T`, shared by cloning.
pub struct QueryCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache bound to the current tokio runtime and subscribe it to
    /// `focus` events.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(name: &'static str, options: QueryOptions, focus: &FocusManager) -> Self {
        let shared = Arc::new(Shared {
            name,
            handle: Handle::current(),
            options,
            entries: Mutex::new(HashMap::new()),
        });
        let listener: Weak<dyn Revalidate> = Arc::downgrade(&shared) as Weak<dyn Revalidate>;
        focus.register(listener);
        Self { shared }
    }

    /// Mount an observer on `key`. Starts a fetch when the entry has never
    /// been fetched, or is stale and `refetch_on_mount` is set, unless one is
    /// already in flight.
    pub fn observe(&self, key: QueryKey, fetcher: Arc<dyn QueryFn<T>>) -> QueryObserver<T> {
        let mut entries = self.shared.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Arc::clone(&fetcher)));
        entry.cancel_gc();
        entry.fetcher = fetcher;
        entry.observers += 1;
        let rx = entry.tx.subscribe();

        let (never_fetched, stale) = {
            let state = entry.tx.borrow();
            (state.updated_at.is_none(), state.is_stale(self.shared.options.stale_time))
        };
        if entry.task.is_none() && (never_fetched || (self.shared.options.refetch_on_mount && stale)) {
            self.shared.start_fetch(&key, entry, FetchTrigger::Mount);
        }
        drop(entries);

        QueryObserver { shared: Arc::clone(&self.shared), key, rx }
    }

    /// Current state of `key`, if it was ever observed.
    #[must_use]
    pub fn snapshot(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.shared
            .lock()
            .get(key)
            .map(|entry| entry.tx.borrow().clone())
    }

    /// Keys with at least one mounted observer.
    #[must_use]
    pub fn mounted_keys(&self) -> Vec<QueryKey> {
        self.shared
            .lock()
            .iter()
            .filter(|(_, entry)| entry.observers > 0)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Restart the fetch of every mounted key under `prefix`. Returns the
    /// number of fetches started.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.shared.lock();
        let mut started = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.observers == 0 || !key.starts_with(prefix) {
                continue;
            }
            entry.cancel_in_flight();
            self.shared.start_fetch(key, entry, FetchTrigger::Invalidate);
            started += 1;
        }
        debug!(cache = self.shared.name, %prefix, started, "invalidated");
        started
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, key: &QueryKey) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.observers == 0) {
            entries.remove(key);
            debug!(cache = self.name, %key, "evicted unobserved entry");
        }
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn unmount(self: &Arc<Self>, key: &QueryKey) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.observers = entry.observers.saturating_sub(1);
        if entry.observers > 0 {
            return;
        }
        if entry.cancel_in_flight() {
            debug!(cache = self.name, %key, "last observer unmounted; fetch cancelled");
            entry.tx.send_modify(|s| {
                s.is_fetching = false;
                s.is_loading = false;
            });
        }
        self.schedule_gc(key, entry);
    }

    fn schedule_gc(self: &Arc<Self>, key: &QueryKey, entry: &mut Entry<T>) {
        entry.cancel_gc();
        let shared = Arc::downgrade(self);
        let key = key.clone();
        let gc_time = self.options.gc_time;
        entry.gc_task = Some(self.handle.spawn(async move {
            tokio::time::sleep(gc_time).await;
            if let Some(shared) = shared.upgrade() {
                shared.evict(&key);
            }
        }));
    }

    fn start_fetch(self: &Arc<Self>, key: &QueryKey, entry: &mut Entry<T>, trigger: FetchTrigger) {
        entry.fetch_seq += 1;
        let seq = entry.fetch_seq;
        entry.tx.send_modify(|s| {
            s.is_fetching = true;
            s.is_loading = s.data.is_none();
            s.last_trigger = Some(trigger);
        });
        debug!(cache = self.name, %key, ?trigger, seq, "fetch started");

        let fetcher = Arc::clone(&entry.fetcher);
        let shared = Arc::clone(self);
        let key = key.clone();
        entry.task = Some(self.handle.spawn(async move {
            let result = fetch_with_retry(fetcher.as_ref(), &shared.options).await;
            shared.settle(&key, seq, result);
        }));
    }

    fn settle(&self, key: &QueryKey, seq: u64, result: Result<T, ApiError>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.fetch_seq != seq || entry.observers == 0 {
            debug!(cache = self.name, %key, seq, "discarding superseded fetch result");
            return;
        }
        entry.task = None;
        if let Err(e) = &result {
            warn!(cache = self.name, %key, error = %e, "query fetch failed");
        }
        entry.tx.send_modify(|s| {
            match result {
                Ok(data) => {
                    s.data = Some(data);
                    s.error = None;
                    s.updated_at = Some(std::time::Instant::now());
                }
                Err(e) => s.error = Some(e),
            }
            s.is_fetching = false;
            s.is_loading = false;
        });
    }

    fn refetch(self: &Arc<Self>, key: &QueryKey) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.cancel_in_flight();
            self.start_fetch(key, entry, FetchTrigger::Refetch);
        }
    }
}

impl<T> Revalidate for Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn revalidate_mounted(self: Arc<Self>, trigger: FetchTrigger) -> usize {
        if trigger == FetchTrigger::Focus && !self.options.refetch_on_focus {
            return 0;
        }
        let mut entries = self.lock();
        let mut started = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.observers == 0 || entry.task.is_some() {
                continue;
            }
            if !entry.tx.borrow().is_stale(self.options.stale_time) {
                continue;
            }
            self.start_fetch(key, entry, trigger);
            started += 1;
        }
        started
    }
}

async fn fetch_with_retry<T>(fetcher: &dyn QueryFn<T>, options: &QueryOptions) -> Result<T, ApiError> {
    let mut attempt: u32 = 0;
    loop {
        match fetcher.fetch().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < options.retry && e.retryable() => {
                let delay = options.retry_delay(attempt);
                debug!(attempt, ?delay, error = %e, "fetch failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// OBSERVER
// =============================================================================

/// A mounted consumer of one query key. Dropping it unmounts.
pub struct QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
    key: QueryKey,
    rx: watch::Receiver<QueryState<T>>,
}

impl<T> QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.rx.borrow().data.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.rx.borrow().error.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.rx.borrow().is_loading
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.rx.borrow().is_fetching
    }

    /// Abort any in-flight fetch for this key and start a new one.
    pub fn refetch(&self) {
        self.shared.refetch(&self.key);
    }

    /// Wait for the next state change and return it.
    pub async fn changed(&mut self) -> QueryState<T> {
        // The sender lives in the entry this observer keeps alive, so the
        // channel cannot close underneath us.
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Wait until no fetch is in flight and return that state.
    pub async fn settled(&mut self) -> QueryState<T> {
        let settled = self
            .rx
            .wait_for(|s| !s.is_fetching)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.rx.borrow().clone())
    }
}

impl<T> Drop for QueryObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shared.unmount(&self.key);
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
