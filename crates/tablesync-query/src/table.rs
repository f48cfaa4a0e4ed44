//! ServerTable — one server-driven table, fully wired.
//!
//! Owns the URL-backed store, the query orchestrator and the debounced
//! search input. A follower task watches the navigator: every location
//! change is decoded and handed to the orchestrator, and the URL's search
//! term is pushed back into the search input as an upstream change.

use std::sync::Arc;
use std::time::Duration;

use tablesync_core::{
    FilterSet, FilterValue, Filters, PageWindow, SortOrder, SyncConfig, TableDefaults,
    TableResult, TableState,
};
use tablesync_input::{CommitFn, DebouncedInput};
use tablesync_state::{Navigator, StoreResult, TableStore, TableUpdate};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::{QueryOptions, QuerySnapshot, TableQuery};

/// Everything a table needs besides its navigator and fetcher.
#[derive(Debug, Clone)]
pub struct ServerTableOptions {
    pub defaults: TableDefaults,
    /// Written into the URL on first load when absent.
    pub default_filters: Filters,
    pub debounce: Duration,
    pub page_size_options: Vec<u32>,
    pub query: QueryOptions,
}

impl Default for ServerTableOptions {
    fn default() -> Self {
        Self {
            defaults: TableDefaults::default(),
            default_filters: Filters::new(),
            debounce: Duration::from_millis(300),
            page_size_options: tablesync_core::pagination::DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            query: QueryOptions::default(),
        }
    }
}

impl ServerTableOptions {
    pub fn from_config(config: &SyncConfig) -> TableResult<Self> {
        Ok(Self {
            defaults: config.table.defaults(),
            default_filters: config.table.default_filters()?,
            debounce: config.table.debounce(),
            page_size_options: config.table.page_size_options.clone(),
            query: QueryOptions::from_config(&config.table, &config.query),
        })
    }
}

pub struct ServerTable<T, N> {
    store: Arc<TableStore<N>>,
    query: TableQuery<T>,
    search: Arc<DebouncedInput>,
    page_size_options: Vec<u32>,
    shutdown: watch::Sender<bool>,
    follower: JoinHandle<()>,
}

impl<T, N> ServerTable<T, N>
where
    T: Send + Sync + 'static,
    N: Navigator + 'static,
{
    /// Wire up a table and write any missing defaults into the URL.
    pub fn spawn(navigator: N, query: TableQuery<T>, options: ServerTableOptions) -> Self {
        let store = Arc::new(
            TableStore::new(navigator)
                .with_defaults(options.defaults)
                .with_default_filters(options.default_filters),
        );
        store.sync_defaults();

        let committer = store.clone();
        let commit: CommitFn = Arc::new(move |search| committer.set_search(search));
        let search = Arc::new(DebouncedInput::spawn(
            store.state().search,
            options.debounce,
            commit,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let follower = tokio::spawn(follow(
            store.clone(),
            query.clone(),
            search.clone(),
            shutdown_rx,
        ));

        Self {
            store,
            query,
            search,
            page_size_options: options.page_size_options,
            shutdown,
            follower,
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Current table state, decoded from the URL.
    pub fn params(&self) -> TableState {
        self.store.state()
    }

    pub fn typed_params<F: FilterSet>(&self) -> TableState<F> {
        self.store.typed_state()
    }

    pub fn store(&self) -> &TableStore<N> {
        &self.store
    }

    pub fn query(&self) -> &TableQuery<T> {
        &self.query
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.query.snapshot()
    }

    /// Wait until the page for the current URL has settled.
    pub async fn settled(&self) -> QuerySnapshot<T> {
        self.query.settled(&self.store.state()).await
    }

    /// Pagination bar figures for the requested page, using the totals of
    /// whatever page is currently shown.
    pub fn page_window(&self) -> PageWindow {
        let state = self.store.state();
        let snapshot = self.query.snapshot();
        PageWindow::for_result(state.page, state.limit, snapshot.data.as_deref())
    }

    pub fn page_size_options(&self) -> &[u32] {
        &self.page_size_options
    }

    pub fn has_active_filters(&self) -> bool {
        self.store.has_active_filters()
    }

    /// Text currently shown in the search input.
    pub fn search_input(&self) -> String {
        self.search.value()
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// A keystroke in the search box. Reaches the URL after the debounce
    /// window.
    pub fn type_search(&self, text: impl Into<String>) {
        self.search.input(text);
    }

    pub fn clear_search(&self) {
        self.search.clear();
    }

    pub fn change_page(&self, page: u32) {
        self.store.set_page(page);
    }

    /// New page size, back to the first page.
    pub fn change_limit(&self, limit: u32) {
        self.store
            .set_many(TableUpdate::new().limit(limit).page(1));
    }

    pub fn set_filter(&self, key: &str, value: Option<FilterValue>) -> StoreResult<()> {
        self.store.set_filter(key, value)
    }

    pub fn set_typed_filters<F: FilterSet>(&self, filters: &F) {
        self.store.set_typed_filters(filters);
    }

    pub fn set_sort(&self, column: impl Into<String>, order: SortOrder) {
        self.store.set_sort(column, order);
    }

    pub fn toggle_sort(&self, column: &str) {
        self.store.toggle_sort(column);
    }

    pub fn set_many(&self, update: TableUpdate) {
        self.store.set_many(update);
    }

    pub fn reset_filters(&self) {
        self.store.reset_filters();
    }

    pub fn reset_all(&self) {
        self.store.reset_all();
    }

    pub fn refetch(&self) {
        self.query.refetch();
    }

    /// Stop following the URL. In-flight requests finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.follower.await;
        debug!("server table stopped");
    }
}

async fn follow<T, N>(
    store: Arc<TableStore<N>>,
    query: TableQuery<T>,
    search: Arc<DebouncedInput>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: Send + Sync + 'static,
    N: Navigator,
{
    let mut changes = store.subscribe();
    query.observe(store.state());

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    debug!("navigator closed, table follower stopping");
                    break;
                }
                let href = changes.borrow_and_update().href();
                let state = store.state();
                debug!(%href, page = state.page, "table following location");
                search.sync_external(state.search.clone());
                query.observe(state);
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
}
