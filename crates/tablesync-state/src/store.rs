//! TableStore — table state read from, and written to, the URL.
//!
//! Every read decodes the navigator's current location; nothing is cached
//! between calls, so back/forward navigation is picked up for free. Every
//! mutation decodes, edits, re-encodes and issues at most one navigation.

use std::sync::atomic::{AtomicBool, Ordering};

use tablesync_core::*;
use tokio::sync::watch;
use tracing::debug;

use crate::error::StoreResult;
use crate::history::{Location, Navigator};

/// One reserved table field with its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    Page(u32),
    Limit(u32),
    Search(String),
    SortBy(String),
    SortOrder(SortOrder),
}

/// A batch of changes applied in one navigation. `None` leaves a field as
/// it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdate {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub filters: Option<Filters>,
}

impl TableUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(order);
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// The canonical table state of one table, backed by a [`Navigator`].
pub struct TableStore<N> {
    navigator: N,
    defaults: TableDefaults,
    default_filters: Filters,
    defaults_synced: AtomicBool,
}

impl<N: Navigator> TableStore<N> {
    pub fn new(navigator: N) -> Self {
        Self {
            navigator,
            defaults: TableDefaults::default(),
            default_filters: Filters::new(),
            defaults_synced: AtomicBool::new(false),
        }
    }

    pub fn with_defaults(mut self, defaults: TableDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Filters that apply whenever the URL does not set the key. They are
    /// also written into the URL by [`TableStore::sync_defaults`].
    pub fn with_default_filters(mut self, filters: Filters) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn defaults(&self) -> TableDefaults {
        self.defaults
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Current state, decoded fresh from the URL.
    pub fn state(&self) -> TableState {
        self.decode_location(&self.navigator.current())
    }

    /// Decode `location`, with the default filters under the URL's own.
    fn decode_location(&self, location: &Location) -> TableState {
        let mut state = decode(&location.query, &self.defaults);
        state.filters.fill_from(&self.default_filters);
        state
    }

    /// Current state with filters viewed through a typed filter set.
    pub fn typed_state<F: FilterSet>(&self) -> TableState<F> {
        self.state().typed()
    }

    pub fn has_active_filters(&self) -> bool {
        self.state().has_active_filters()
    }

    /// Location changes, for anything that has to re-derive state.
    pub fn subscribe(&self) -> watch::Receiver<Location> {
        self.navigator.subscribe()
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Write `state` to the URL.
    fn commit(&self, state: &TableState) {
        let current = self.navigator.current();
        self.navigate(current.with_query(encode(state, &self.defaults)));
    }

    /// Push `next` unless it decodes to the state already shown.
    fn navigate(&self, next: Location) {
        let current = self.navigator.current();
        if next == current || self.decode_location(&next) == self.decode_location(&current) {
            debug!(href = %current.href(), "table state unchanged, no navigation");
            return;
        }
        debug!(href = %next.href(), "table state committed");
        self.navigator.push(next);
    }

    /// Update one reserved field. Changing the search goes back to page 1.
    pub fn set_field(&self, field: TableField) {
        let mut state = self.state();
        match field {
            TableField::Page(page) => state.page = page.max(1),
            TableField::Limit(limit) => state.limit = limit.max(1),
            TableField::Search(search) => {
                state.search = search;
                state.page = DEFAULT_PAGE;
            }
            TableField::SortBy(sort_by) => state.sort_by = sort_by,
            TableField::SortOrder(order) => state.sort_order = order,
        }
        self.commit(&state);
    }

    pub fn set_page(&self, page: u32) {
        self.set_field(TableField::Page(page));
    }

    pub fn set_limit(&self, limit: u32) {
        self.set_field(TableField::Limit(limit));
    }

    pub fn set_search(&self, search: impl Into<String>) {
        self.set_field(TableField::Search(search.into()));
    }

    pub fn set_sort(&self, sort_by: impl Into<String>, order: SortOrder) {
        self.set_many(TableUpdate::new().sort(sort_by, order));
    }

    /// Set or clear one filter and go back to page 1.
    ///
    /// `None` and empty values remove the key. A reserved key is rejected
    /// without navigating.
    pub fn set_filter(&self, key: &str, value: Option<FilterValue>) -> StoreResult<()> {
        let key = FilterKey::parse(key)?;
        let mut state = self.state();
        state.filters.set(&key, value);
        state.page = DEFAULT_PAGE;
        self.commit(&state);
        Ok(())
    }

    /// Replace the whole filter bag and go back to page 1.
    pub fn set_filters(&self, filters: Filters) {
        let mut state = self.state();
        state.filters = filters;
        state.page = DEFAULT_PAGE;
        self.commit(&state);
    }

    pub fn set_typed_filters<F: FilterSet>(&self, filters: &F) {
        self.set_filters(filters.to_filters());
    }

    /// Apply several changes in a single navigation.
    ///
    /// Changing search or filters without naming a page resets to page 1.
    pub fn set_many(&self, update: TableUpdate) {
        let mut state = self.state();
        let narrows = update.search.is_some() || update.filters.is_some();

        if let Some(limit) = update.limit {
            state.limit = limit.max(1);
        }
        if let Some(search) = update.search {
            state.search = search;
        }
        if let Some(sort_by) = update.sort_by {
            state.sort_by = sort_by;
        }
        if let Some(order) = update.sort_order {
            state.sort_order = order;
        }
        if let Some(filters) = update.filters {
            state.filters = filters;
        }
        match update.page {
            Some(page) => state.page = page.max(1),
            None if narrows => state.page = DEFAULT_PAGE,
            None => {}
        }

        self.commit(&state);
    }

    /// Drop every parameter. Default filters still apply afterwards.
    pub fn reset_all(&self) {
        let current = self.navigator.current();
        debug!(path = %current.path, "table state reset");
        self.navigate(current.with_query(QueryParams::new()));
    }

    /// Drop filters only; page, limit, search and sort stay. Default
    /// filters still apply afterwards.
    pub fn reset_filters(&self) {
        let mut state = self.state();
        state.filters.clear();
        self.commit(&state);
    }

    /// Walk `column` through unsorted → ascending → descending → unsorted.
    pub fn toggle_sort(&self, column: &str) {
        let mut state = self.state();
        let next = state.sort_state().toggle(column);
        state.set_sort_state(next);
        self.commit(&state);
    }

    /// Write defaults that are missing from the URL, once per store.
    ///
    /// Global defaults (`page`, `limit`, `sort_order`) come first, then the
    /// configured default filters; anything already in the URL is kept. The
    /// write replaces the current history entry. Returns whether the URL
    /// changed.
    pub fn sync_defaults(&self) -> bool {
        if self.defaults_synced.swap(true, Ordering::SeqCst) {
            return false;
        }

        let current = self.navigator.current();
        let mut query = current.query.clone();
        let mut changed = false;

        let globals = [
            (PAGE_KEY, DEFAULT_PAGE.to_string()),
            (LIMIT_KEY, self.defaults.limit.to_string()),
            (SORT_ORDER_KEY, SortOrder::Asc.as_str().to_string()),
        ];
        for (key, value) in globals {
            if !query.has(key) {
                query.append(key, value);
                changed = true;
            }
        }

        for (key, value) in self.default_filters.iter() {
            if !query.has(key) && !value.is_empty() {
                query.append(key, value.to_query());
                changed = true;
            }
        }

        if changed {
            let next = current.with_query(query);
            debug!(href = %next.href(), "table defaults synced to URL");
            self.navigator.replace(next);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::StoreError;
    use crate::history::History;

    fn store_at(href: &str) -> TableStore<Arc<History>> {
        TableStore::new(Arc::new(History::at(href)))
    }

    fn href(store: &TableStore<Arc<History>>) -> String {
        store.navigator().current().href()
    }

    #[test]
    fn state_is_decoded_from_current_url() {
        let store = store_at("/users?page=4&status=active");
        assert_eq!(store.state().page, 4);

        store.set_page(5);
        assert_eq!(store.state().page, 5);

        store.navigator().back();
        assert_eq!(store.state().page, 4);
    }

    #[test]
    fn set_search_resets_page() {
        let store = store_at("/users?page=3&limit=25");
        store.set_search("ada");
        assert_eq!(href(&store), "/users?limit=25&search=ada");
        assert_eq!(store.navigator().len(), 2);
    }

    #[test]
    fn set_search_to_same_value_still_resets_page() {
        let store = store_at("/users?page=3&search=ada");
        store.set_search("ada");
        assert_eq!(store.state().page, 1);
    }

    #[test]
    fn set_filter_resets_page_and_drops_empty() {
        let store = store_at("/users?page=3&role=admin");
        store.set_filter("status", Some("active".into())).unwrap();
        assert_eq!(href(&store), "/users?role=admin&status=active");

        store.set_filter("role", None).unwrap();
        store.set_filter("status", Some("".into())).unwrap();
        assert_eq!(href(&store), "/users");
    }

    #[test]
    fn set_filter_rejects_reserved_key_without_navigating() {
        let store = store_at("/users?page=3");
        let err = store.set_filter("sort_by", Some("name".into())).unwrap_err();
        assert_eq!(err, StoreError::ReservedKey("sort_by".into()));
        assert_eq!(store.navigator().len(), 1);
        assert_eq!(store.state().page, 3);
    }

    #[test]
    fn set_many_is_one_navigation() {
        let store = store_at("/users?page=7");
        store.set_many(TableUpdate::new().limit(50).page(1));
        assert_eq!(store.navigator().len(), 2);
        assert_eq!(href(&store), "/users?limit=50");
    }

    #[test]
    fn set_many_with_filters_resets_unnamed_page() {
        let store = store_at("/users?page=7");
        let filters = Filters::new().with("status", "active").unwrap();
        store.set_many(TableUpdate::new().filters(filters).sort("name", SortOrder::Desc));
        let state = store.state();
        assert_eq!(state.page, 1);
        assert_eq!(state.sort_by, "name");
        assert_eq!(state.sort_order, SortOrder::Desc);
        assert_eq!(state.filters.get_str("status"), Some("active"));
    }

    #[test]
    fn set_sort_keeps_page() {
        let store = store_at("/users?page=2");
        store.set_sort("email", SortOrder::Asc);
        assert_eq!(href(&store), "/users?page=2&sort_by=email");
    }

    #[test]
    fn unchanged_state_does_not_navigate() {
        let store = store_at("/users?page=2");
        store.set_page(2);
        assert_eq!(store.navigator().len(), 1);
    }

    #[test]
    fn reset_all_clears_query() {
        let store = store_at("/users?page=2&search=x&status=active");
        store.reset_all();
        assert_eq!(href(&store), "/users");
        store.reset_all();
        assert_eq!(store.navigator().len(), 2);
    }

    #[test]
    fn reset_filters_keeps_page_and_search() {
        let store = store_at("/users?page=3&search=x&status=active");
        store.reset_filters();
        let state = store.state();
        assert_eq!(state.page, 3);
        assert_eq!(state.search, "x");
        assert!(state.filters.is_empty());
    }

    #[test]
    fn toggle_sort_cycles_three_states() {
        let store = store_at("/users");
        store.toggle_sort("name");
        assert_eq!(href(&store), "/users?sort_by=name");
        store.toggle_sort("name");
        assert_eq!(href(&store), "/users?sort_by=name&sort_order=desc");
        store.toggle_sort("name");
        assert_eq!(href(&store), "/users");
        assert!(store.state().sort_by.is_empty());
    }

    #[test]
    fn sync_defaults_fills_missing_values_once() {
        let filters = Filters::new()
            .with("status", "active")
            .unwrap()
            .with("role", "admin")
            .unwrap();
        let store = store_at("/users?role=user&limit=25").with_default_filters(filters);

        assert!(store.sync_defaults());
        let location = store.navigator().current();
        assert_eq!(location.query.get("limit"), Some("25"));
        assert_eq!(location.query.get("page"), Some("1"));
        assert_eq!(location.query.get("sort_order"), Some("asc"));
        assert_eq!(location.query.get("role"), Some("user"));
        assert_eq!(location.query.get("status"), Some("active"));
        assert_eq!(store.navigator().len(), 1);

        store.reset_all();
        assert!(!store.sync_defaults());
        assert_eq!(href(&store), "/users");
    }

    #[test]
    fn default_filters_apply_under_the_url() {
        let defaults = Filters::new().with("status", "active").unwrap();
        let store = store_at("/users?status=pending").with_default_filters(defaults.clone());
        assert_eq!(store.state().filters.get_str("status"), Some("pending"));

        store.reset_filters();
        assert_eq!(href(&store), "/users");
        assert_eq!(store.state().filters, defaults);

        let reloaded = store_at(&href(&store)).with_default_filters(defaults);
        reloaded.sync_defaults();
        assert_eq!(reloaded.state(), store.state());
    }

    #[test]
    fn clearing_a_default_filter_is_not_a_navigation() {
        let defaults = Filters::new().with("status", "active").unwrap();
        let store = store_at("/users").with_default_filters(defaults);
        store.sync_defaults();
        store.set_filter("status", None).unwrap();
        assert_eq!(store.navigator().len(), 1);
        assert_eq!(store.state().filters.get_str("status"), Some("active"));
    }

    #[test]
    fn same_state_after_sync_does_not_navigate() {
        let store = store_at("/users");
        store.sync_defaults();
        let synced = href(&store);

        store.set_page(1);
        store.set_limit(10);
        store.set_sort("", SortOrder::Asc);
        store.reset_all();
        assert_eq!(store.navigator().len(), 1);
        assert_eq!(href(&store), synced);

        store.set_page(2);
        assert_eq!(store.navigator().len(), 2);
    }

    #[test]
    fn synced_defaults_do_not_change_state() {
        let store = store_at("/users?page=2");
        let before = store.state();
        store.sync_defaults();
        assert_eq!(store.state(), before);
    }

    #[test]
    fn configured_limit_is_not_written() {
        let store = store_at("/users").with_defaults(TableDefaults { limit: 25 });
        store.set_limit(25);
        assert_eq!(href(&store), "/users");
        store.set_limit(10);
        assert_eq!(href(&store), "/users?limit=10");
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct StatusOnly {
        status: Option<String>,
    }

    const STATUS: FilterKey = FilterKey::from_static("status");

    impl FilterSet for StatusOnly {
        fn from_filters(filters: &Filters) -> Self {
            Self {
                status: filters.get_str(STATUS.as_str()).map(str::to_string),
            }
        }

        fn to_filters(&self) -> Filters {
            let mut filters = Filters::new();
            filters.set(&STATUS, self.status.clone().map(FilterValue::from));
            filters
        }
    }

    #[test]
    fn typed_filters_round_trip_through_url() {
        let store = store_at("/users?page=4");
        store.set_typed_filters(&StatusOnly {
            status: Some("pending".into()),
        });
        let typed: TableState<StatusOnly> = store.typed_state();
        assert_eq!(typed.page, 1);
        assert_eq!(typed.filters.status.as_deref(), Some("pending"));
    }
}
