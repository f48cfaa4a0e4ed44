//! Shared types used across tablesync crates.
//!
//! The URL is the only place table state lives. Everything here is a plain
//! value that can be rebuilt from a query string at any time.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};

/// Page shown when the URL names none.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when neither the URL nor the config names one.
pub const DEFAULT_LIMIT: u32 = 10;

pub const PAGE_KEY: &str = "page";
pub const LIMIT_KEY: &str = "limit";
pub const SEARCH_KEY: &str = "search";
pub const SORT_BY_KEY: &str = "sort_by";
pub const SORT_ORDER_KEY: &str = "sort_order";

/// Query keys owned by the table itself. Every other key is a filter.
pub const RESERVED_KEYS: [&str; 5] = [PAGE_KEY, LIMIT_KEY, SEARCH_KEY, SORT_BY_KEY, SORT_ORDER_KEY];

const fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Whether `key` is one of the five table-owned query keys.
pub const fn is_reserved_key(key: &str) -> bool {
    let key = key.as_bytes();
    let mut i = 0;
    while i < RESERVED_KEYS.len() {
        if bytes_eq(key, RESERVED_KEYS[i].as_bytes()) {
            return true;
        }
        i += 1;
    }
    false
}

// ── Sorting ────────────────────────────────────────────────────────

/// Direction of the active sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Parse a URL value. Anything other than `desc` means ascending.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three-state sort cycle a column header walks through.
///
/// `Unsorted → Ascending(col) → Descending(col) → Unsorted`. Toggling a
/// column other than the sorted one starts over at `Ascending`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SortState {
    #[default]
    Unsorted,
    Ascending(String),
    Descending(String),
}

impl SortState {
    /// Build from the stored `sort_by`/`sort_order` pair.
    pub fn from_parts(sort_by: &str, order: SortOrder) -> Self {
        if sort_by.is_empty() {
            return SortState::Unsorted;
        }
        match order {
            SortOrder::Asc => SortState::Ascending(sort_by.to_string()),
            SortOrder::Desc => SortState::Descending(sort_by.to_string()),
        }
    }

    /// Next state after the user clicks `column`.
    pub fn toggle(&self, column: &str) -> SortState {
        match self {
            SortState::Ascending(current) if current == column => {
                SortState::Descending(column.to_string())
            }
            SortState::Descending(current) if current == column => SortState::Unsorted,
            _ => SortState::Ascending(column.to_string()),
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            SortState::Unsorted => None,
            SortState::Ascending(c) | SortState::Descending(c) => Some(c),
        }
    }

    /// Split back into the stored pair. Unsorted clears both fields.
    pub fn into_parts(self) -> (String, SortOrder) {
        match self {
            SortState::Unsorted => (String::new(), SortOrder::Asc),
            SortState::Ascending(c) => (c, SortOrder::Asc),
            SortState::Descending(c) => (c, SortOrder::Desc),
        }
    }
}

// ── Filters ────────────────────────────────────────────────────────

/// A validated filter key: non-empty and not one of [`RESERVED_KEYS`].
///
/// Keys known at compile time should be declared with
/// [`FilterKey::from_static`] in a `const`, which turns a collision with a
/// reserved key into a compile error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterKey(Cow<'static, str>);

impl FilterKey {
    pub const fn from_static(key: &'static str) -> Self {
        assert!(!key.is_empty(), "filter key must not be empty");
        assert!(!is_reserved_key(key), "filter key collides with a reserved table parameter");
        FilterKey(Cow::Borrowed(key))
    }

    pub fn parse(key: impl Into<String>) -> TableResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TableError::EmptyKey);
        }
        if is_reserved_key(&key) {
            return Err(TableError::ReservedKey(key));
        }
        Ok(FilterKey(Cow::Owned(key)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single filter value as it travels through the URL.
///
/// Normalized so that JSON strings are always `Text` and only arrays and
/// objects end up in `Structured`; use [`FilterValue::from_json`] when
/// starting from an arbitrary JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Structured(serde_json::Value),
}

impl FilterValue {
    /// Decode a raw query value: JSON first, plain text otherwise.
    ///
    /// A text value that happens to be valid JSON (`"123"`, `"true"`) comes
    /// back as that JSON value. Existing URLs depend on this, so it stays.
    /// Returns `None` for values that mean "no constraint".
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => Self::from_json(value),
            Err(_) if raw.is_empty() => None,
            Err(_) => Some(FilterValue::Text(raw.to_string())),
        }
    }

    /// Normalize a JSON value. `null` and `""` map to `None`.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(FilterValue::Bool(b)),
            serde_json::Value::Number(n) => Some(FilterValue::Number(n)),
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(FilterValue::Text(s)),
            other => Some(FilterValue::Structured(other)),
        }
    }

    /// The string written into the URL for this value.
    pub fn to_query(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Text(s) => s.clone(),
            FilterValue::Structured(v) => v.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Bool(b) => serde_json::Value::Bool(*b),
            FilterValue::Number(n) => serde_json::Value::Number(n.clone()),
            FilterValue::Text(s) => serde_json::Value::String(s.clone()),
            FilterValue::Structured(v) => v.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Empty text or a JSON `null` carries no constraint.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) => s.is_empty(),
            FilterValue::Structured(v) => v.is_null(),
            _ => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Number(n.into())
    }
}

impl From<u32> for FilterValue {
    fn from(n: u32) -> Self {
        FilterValue::Number(n.into())
    }
}

/// The open set of filters, ordered by key.
///
/// Never holds a reserved key and never holds an empty value: setting a
/// key to `None` or to an empty value removes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, FilterValue>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a filter under an already-validated key.
    ///
    /// The value is normalized first, so a hand-built
    /// `Structured(json!("x"))` is stored as `Text("x")`.
    pub fn set(&mut self, key: &FilterKey, value: Option<FilterValue>) {
        match value.and_then(|v| FilterValue::from_json(v.to_json())) {
            Some(v) => {
                self.0.insert(key.as_str().to_string(), v);
            }
            None => {
                self.0.remove(key.as_str());
            }
        }
    }

    /// Set or clear a filter under an arbitrary key.
    pub fn try_set(&mut self, key: &str, value: Option<FilterValue>) -> TableResult<()> {
        let key = FilterKey::parse(key)?;
        self.set(&key, value);
        Ok(())
    }

    /// Builder form of [`Filters::try_set`].
    pub fn with(mut self, key: &str, value: impl Into<FilterValue>) -> TableResult<Self> {
        self.try_set(key, Some(value.into()))?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(FilterValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<FilterValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Take every entry of `base` whose key this bag does not set.
    pub fn fill_from(&mut self, base: &Filters) {
        for (key, value) in &base.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// A caller-defined, typed view of the filter bag.
///
/// Implementations declare their keys with [`FilterKey::from_static`], so a
/// key that would shadow `page`, `limit` and friends never compiles.
pub trait FilterSet: Clone + Default + PartialEq {
    fn from_filters(filters: &Filters) -> Self;
    fn to_filters(&self) -> Filters;
}

impl FilterSet for Filters {
    fn from_filters(filters: &Filters) -> Self {
        filters.clone()
    }

    fn to_filters(&self) -> Filters {
        self.clone()
    }
}

// ── Table state ────────────────────────────────────────────────────

/// Defaults a table falls back to when the URL is silent or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefaults {
    pub limit: u32,
}

impl Default for TableDefaults {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

/// Everything a server needs to produce one page of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState<F = Filters> {
    pub page: u32,
    pub limit: u32,
    pub search: String,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub filters: F,
}

impl<F: Default> Default for TableState<F> {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: String::new(),
            sort_by: String::new(),
            sort_order: SortOrder::Asc,
            filters: F::default(),
        }
    }
}

impl<F> TableState<F> {
    pub fn sort_state(&self) -> SortState {
        SortState::from_parts(&self.sort_by, self.sort_order)
    }

    pub fn set_sort_state(&mut self, sort: SortState) {
        let (sort_by, sort_order) = sort.into_parts();
        self.sort_by = sort_by;
        self.sort_order = sort_order;
    }
}

impl TableState<Filters> {
    /// Bare state for a table with the given defaults.
    pub fn with_defaults(defaults: &TableDefaults) -> Self {
        Self {
            limit: defaults.limit,
            ..Self::default()
        }
    }

    /// View the filter bag through a typed filter set.
    pub fn typed<F: FilterSet>(&self) -> TableState<F> {
        TableState {
            page: self.page,
            limit: self.limit,
            search: self.search.clone(),
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
            filters: F::from_filters(&self.filters),
        }
    }

    /// True when a search term or any filter narrows the result set.
    pub fn has_active_filters(&self) -> bool {
        !self.filters.is_empty() || !self.search.is_empty()
    }
}

impl<F: FilterSet> TableState<F> {
    pub fn untyped(&self) -> TableState<Filters> {
        TableState {
            page: self.page,
            limit: self.limit,
            search: self.search.clone(),
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
            filters: self.filters.to_filters(),
        }
    }
}

// ── Fetch results ──────────────────────────────────────────────────

/// One page of rows as returned by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> FetchResult<T> {
    /// Build a page, deriving `total_pages = ceil(total / limit)`.
    pub fn new(data: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> FetchResult<U> {
        FetchResult {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_detected() {
        for key in RESERVED_KEYS {
            assert!(is_reserved_key(key));
        }
        assert!(!is_reserved_key("status"));
        assert!(!is_reserved_key("pages"));
        assert!(!is_reserved_key(""));
    }

    #[test]
    fn sort_cycle_walks_three_states() {
        let s = SortState::Unsorted;
        let s = s.toggle("name");
        assert_eq!(s, SortState::Ascending("name".into()));
        let s = s.toggle("name");
        assert_eq!(s, SortState::Descending("name".into()));
        let s = s.toggle("name");
        assert_eq!(s, SortState::Unsorted);
    }

    #[test]
    fn sort_toggle_on_other_column_restarts_ascending() {
        let s = SortState::Descending("name".into()).toggle("email");
        assert_eq!(s, SortState::Ascending("email".into()));
    }

    #[test]
    fn unsorted_parts_clear_order() {
        assert_eq!(SortState::Unsorted.into_parts(), (String::new(), SortOrder::Asc));
        assert_eq!(SortState::from_parts("", SortOrder::Desc), SortState::Unsorted);
    }

    #[test]
    fn sort_order_parse_is_lenient() {
        assert_eq!(SortOrder::parse_lenient("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse_lenient("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse_lenient("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse_lenient("sideways"), SortOrder::Asc);
    }

    #[test]
    fn filter_value_parse_prefers_json() {
        assert_eq!(FilterValue::parse("true"), Some(FilterValue::Bool(true)));
        assert_eq!(FilterValue::parse("42"), Some(FilterValue::from(42i64)));
        assert_eq!(FilterValue::parse("active"), Some(FilterValue::from("active")));
        assert_eq!(
            FilterValue::parse(r#"{"min":1}"#),
            Some(FilterValue::Structured(serde_json::json!({"min": 1})))
        );
        assert_eq!(FilterValue::parse(r#""quoted""#), Some(FilterValue::from("quoted")));
    }

    #[test]
    fn filter_value_parse_drops_empty_and_null() {
        assert_eq!(FilterValue::parse(""), None);
        assert_eq!(FilterValue::parse("null"), None);
        assert_eq!(FilterValue::parse(r#""""#), None);
    }

    #[test]
    fn filters_reject_reserved_keys() {
        let mut filters = Filters::new();
        let err = filters.try_set("page", Some("2".into())).unwrap_err();
        assert_eq!(err, TableError::ReservedKey("page".into()));
        assert_eq!(filters.try_set("", Some("x".into())), Err(TableError::EmptyKey));
        assert!(filters.is_empty());
    }

    #[test]
    fn filters_drop_empty_values() {
        let mut filters = Filters::new().with("status", "active").unwrap();
        filters.try_set("status", Some("".into())).unwrap();
        assert!(filters.is_empty());

        let mut filters = Filters::new().with("role", "admin").unwrap();
        filters.try_set("role", None).unwrap();
        assert!(!filters.contains_key("role"));
    }

    #[test]
    fn hand_built_values_are_normalized() {
        let mut filters = Filters::new();
        filters
            .try_set("status", Some(FilterValue::Structured(serde_json::json!("active"))))
            .unwrap();
        filters
            .try_set("age", Some(FilterValue::Structured(serde_json::json!(5))))
            .unwrap();
        filters
            .try_set("gone", Some(FilterValue::Structured(serde_json::Value::Null)))
            .unwrap();

        assert_eq!(filters.get("status"), Some(&FilterValue::Text("active".into())));
        assert_eq!(filters.get("age"), Some(&FilterValue::from(5i64)));
        assert!(!filters.contains_key("gone"));
    }

    #[test]
    fn static_filter_key_is_const() {
        const STATUS: FilterKey = FilterKey::from_static("status");
        let mut filters = Filters::new();
        filters.set(&STATUS, Some("active".into()));
        assert_eq!(filters.get_str("status"), Some("active"));
    }

    #[test]
    fn fetch_result_total_pages_rounds_up() {
        let r: FetchResult<u8> = FetchResult::new(vec![], 120, 1, 10);
        assert_eq!(r.total_pages, 12);
        let r: FetchResult<u8> = FetchResult::new(vec![], 121, 1, 10);
        assert_eq!(r.total_pages, 13);
        let r: FetchResult<u8> = FetchResult::new(vec![], 0, 1, 10);
        assert_eq!(r.total_pages, 0);
    }

    #[test]
    fn fetch_result_serializes_camel_case() {
        let r = FetchResult::new(vec![1u8, 2], 2, 1, 10);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }
}
