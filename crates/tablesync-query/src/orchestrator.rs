//! Query orchestrator: turns the current table state into a fetched page.
//!
//! Every state maps to a cache key (namespace plus the serialized state).
//! Observing a new key issues one request, or joins the request already in
//! flight for that key. Requests carry a generation number; a response is
//! applied to the view only while its key is current and its generation is
//! the newest one issued for that key. Anything else is dropped from the
//! view, though a successful page still lands in the cache.
//!
//! The view is published through a `watch` channel as a [`QuerySnapshot`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tablesync_core::config::{QueryConfig, TableConfig};
use tablesync_core::{FetchResult, TableState};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheStats, QueryCache};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

type FetchFn<T> =
    Arc<dyn Fn(TableState) -> BoxFuture<'static, Result<FetchResult<T>, FetchError>> + Send + Sync>;

/// A request that any number of callers can await.
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<FetchResult<T>>, FetchError>>>;

// ── Options ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Prefix of every cache key issued by this query.
    pub namespace: String,
    pub cache: CacheConfig,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_backoff: Duration,
    /// Keep showing the previous page while a new key loads.
    pub keep_previous_data: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            namespace: "table".to_string(),
            cache: CacheConfig::default(),
            max_retries: 1,
            retry_backoff: Duration::from_millis(500),
            keep_previous_data: true,
        }
    }
}

impl QueryOptions {
    pub fn from_config(table: &TableConfig, query: &QueryConfig) -> Self {
        Self {
            namespace: table.namespace.clone(),
            cache: CacheConfig {
                ttl: query.cache_ttl(),
                max_entries: query.max_entries.max(1),
            },
            max_retries: query.max_retries,
            retry_backoff: query.retry_backoff(),
            keep_previous_data: query.keep_previous_data,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Cache key for `state` under `namespace`.
pub fn query_key(namespace: &str, state: &TableState) -> String {
    match serde_json::to_string(state) {
        Ok(body) => format!("{namespace}:{body}"),
        Err(_) => format!("{namespace}:{state:?}"),
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// What a consumer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// Nothing observed yet.
    Idle,
    /// First load of a key with nothing to show.
    Loading,
    Error,
    /// Loaded, zero rows.
    Empty,
    Ready,
}

/// The orchestrator's view at one point in time.
#[derive(Debug)]
pub struct QuerySnapshot<T> {
    /// Key of the current state.
    pub key: Option<String>,
    /// Last good page, possibly for an earlier key.
    pub data: Option<Arc<FetchResult<T>>>,
    /// Key `data` was fetched for.
    pub data_key: Option<String>,
    pub is_fetching: bool,
    pub error: Option<FetchError>,
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            data: self.data.clone(),
            data_key: self.data_key.clone(),
            is_fetching: self.is_fetching,
            error: self.error.clone(),
        }
    }
}

impl<T> Default for QuerySnapshot<T> {
    fn default() -> Self {
        Self {
            key: None,
            data: None,
            data_key: None,
            is_fetching: false,
            error: None,
        }
    }
}

impl<T> QuerySnapshot<T> {
    /// Fetching with nothing to show.
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    /// The shown page belongs to a previous key.
    pub fn is_placeholder(&self) -> bool {
        self.data.is_some() && self.data_key != self.key
    }

    pub fn rows(&self) -> &[T] {
        self.data.as_deref().map_or(&[], |page| page.data.as_slice())
    }

    pub fn total(&self) -> u64 {
        self.data.as_ref().map_or(0, |page| page.total)
    }

    pub fn total_pages(&self) -> u64 {
        self.data.as_ref().map_or(0, |page| page.total_pages)
    }

    pub fn status(&self) -> ViewStatus {
        if self.key.is_none() {
            return ViewStatus::Idle;
        }
        if self.is_loading() {
            return ViewStatus::Loading;
        }
        if self.error.is_some() {
            return ViewStatus::Error;
        }
        match &self.data {
            None => ViewStatus::Loading,
            Some(page) if page.is_empty() => ViewStatus::Empty,
            Some(_) => ViewStatus::Ready,
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────

struct InFlight<T> {
    generation: u64,
    request: SharedFetch<T>,
}

#[derive(Clone)]
struct Current {
    key: String,
    state: TableState,
    /// Generation the view is waiting on.
    generation: u64,
}

struct QueryState<T> {
    cache: QueryCache<T>,
    in_flight: HashMap<String, InFlight<T>>,
    current: Option<Current>,
    next_generation: u64,
    view: QuerySnapshot<T>,
}

struct Inner<T> {
    options: QueryOptions,
    fetch: FetchFn<T>,
    state: Mutex<QueryState<T>>,
    snapshots: watch::Sender<QuerySnapshot<T>>,
}

/// Keyed fetching for one table. Cheap to clone; clones share everything.
pub struct TableQuery<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TableQuery<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> TableQuery<T> {
    /// Query backed by a fetcher that already yields pages.
    pub fn new<F>(fetcher: F, options: QueryOptions) -> Self
    where
        F: Fetcher<Response = FetchResult<T>>,
    {
        Self::from_fn(options, Arc::new(move |state: TableState| fetcher.fetch(state)))
    }

    /// Query backed by a fetcher whose responses need reshaping into pages.
    pub fn with_transform<F, X>(fetcher: F, transform: X, options: QueryOptions) -> Self
    where
        F: Fetcher,
        X: Fn(F::Response) -> FetchResult<T> + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Self::from_fn(
            options,
            Arc::new(move |state: TableState| {
                let transform = transform.clone();
                fetcher
                    .fetch(state)
                    .map(move |response| response.map(|r| (*transform)(r)))
                    .boxed()
            }),
        )
    }

    fn from_fn(options: QueryOptions, fetch: FetchFn<T>) -> Self {
        let (snapshots, _) = watch::channel(QuerySnapshot::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueryState {
                    cache: QueryCache::new(options.cache.clone()),
                    in_flight: HashMap::new(),
                    current: None,
                    next_generation: 0,
                    view: QuerySnapshot::default(),
                }),
                options,
                fetch,
                snapshots,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryState<T>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    pub fn key_for(&self, state: &TableState) -> String {
        query_key(&self.inner.options.namespace, state)
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.inner.snapshots.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().cache.stats()
    }

    /// Make `state` the one the view follows. Re-observing the current key
    /// does nothing.
    pub fn observe(&self, state: TableState) {
        let key = self.key_for(&state);
        let mut st = self.lock();
        if st.current.as_ref().is_some_and(|c| c.key == key) {
            return;
        }

        let generation = match st.in_flight.get(&key) {
            Some(flight) => {
                debug!(key = %key, generation = flight.generation, "joining in-flight request");
                flight.generation
            }
            None => self.issue(&mut st, &key, state.clone()).0,
        };

        let cached = st.cache.get(&key);
        let keep_previous = self.inner.options.keep_previous_data;
        let view = &mut st.view;
        view.key = Some(key.clone());
        view.is_fetching = true;
        view.error = None;
        match cached {
            Some(page) => {
                view.data = Some(page);
                view.data_key = Some(key.clone());
            }
            None if !keep_previous => {
                view.data = None;
                view.data_key = None;
            }
            None => {}
        }

        st.current = Some(Current {
            key,
            state,
            generation,
        });
        self.inner.snapshots.send_replace(st.view.clone());
    }

    /// Re-issue the current key, whatever is cached or in flight. Returns
    /// the new request, or `None` before anything was observed.
    pub fn refetch(&self) -> Option<SharedFetch<T>> {
        let mut st = self.lock();
        let current = st.current.clone()?;
        let (generation, request) = self.issue(&mut st, &current.key, current.state.clone());
        st.current = Some(Current {
            generation,
            ..current
        });
        st.view.is_fetching = true;
        self.inner.snapshots.send_replace(st.view.clone());
        Some(request)
    }

    /// Fetch `state` without making it current, joining any request already
    /// in flight for the same key. Useful for prefetching the next page.
    pub fn fetch(&self, state: TableState) -> SharedFetch<T> {
        let key = self.key_for(&state);
        let mut st = self.lock();
        if let Some(flight) = st.in_flight.get(&key) {
            return flight.request.clone();
        }
        self.issue(&mut st, &key, state).1
    }

    /// Forget every cached page of this table and refetch the current one.
    pub fn invalidate(&self) -> Option<SharedFetch<T>> {
        let prefix = format!("{}:", self.inner.options.namespace);
        let dropped = self.lock().cache.invalidate_prefix(&prefix);
        debug!(namespace = %self.inner.options.namespace, dropped, "query cache invalidated");
        self.refetch()
    }

    /// Wait until the view shows a settled result for `state`.
    pub async fn settled(&self, state: &TableState) -> QuerySnapshot<T> {
        let key = self.key_for(state);
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|s| s.key.as_deref() == Some(key.as_str()) && !s.is_fetching)
            .await
            .map(|s| s.clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    /// Start a request for `key` and register it as the newest for that key.
    fn issue(
        &self,
        st: &mut QueryState<T>,
        key: &str,
        state: TableState,
    ) -> (u64, SharedFetch<T>) {
        let generation = st.next_generation;
        st.next_generation += 1;

        let request = self.request(key.to_string(), state, generation);
        st.in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                request: request.clone(),
            },
        );

        let query = self.clone();
        let key = key.to_string();
        let waiter = request.clone();
        tokio::spawn(async move {
            let result = waiter.await;
            query.settle(&key, generation, result);
        });
        (generation, request)
    }

    fn request(&self, key: String, state: TableState, generation: u64) -> SharedFetch<T> {
        let fetch = self.inner.fetch.clone();
        let max_retries = self.inner.options.max_retries;
        let backoff = self.inner.options.retry_backoff;

        async move {
            let mut attempt = 0u32;
            loop {
                debug!(key = %key, generation, attempt, "fetch issued");
                match (*fetch)(state.clone()).await {
                    Ok(page) => return Ok(Arc::new(page)),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        let delay = backoff.saturating_mul(2u32.saturating_pow(attempt));
                        warn!(
                            key = %key,
                            attempt,
                            error = %e,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!(key = %key, generation, error = %e, "fetch failed");
                        return Err(e);
                    }
                }
            }
        }
        .boxed()
        .shared()
    }

    fn settle(&self, key: &str, generation: u64, result: Result<Arc<FetchResult<T>>, FetchError>) {
        let mut st = self.lock();
        if st
            .in_flight
            .get(key)
            .is_some_and(|f| f.generation == generation)
        {
            st.in_flight.remove(key);
        }
        if let Ok(page) = &result {
            st.cache.insert(key, page.clone(), generation);
        }

        let applies = st
            .current
            .as_ref()
            .is_some_and(|c| c.key == key && c.generation == generation);
        if !applies {
            debug!(key, generation, "stale response dropped");
            return;
        }

        match result {
            Ok(page) => {
                debug!(key, generation, rows = page.data.len(), total = page.total, "fetch resolved");
                st.view.data = Some(page);
                st.view.data_key = Some(key.to_string());
                st.view.error = None;
            }
            Err(e) => {
                st.view.error = Some(e);
            }
        }
        st.view.is_fetching = false;
        self.inner.snapshots.send_replace(st.view.clone());
    }
}
