//! URL query codec for [`TableState`].
//!
//! `decode` never fails: malformed `page`/`limit` fall back to defaults and
//! every non-reserved key becomes a filter. `encode` writes only what
//! differs from the defaults, so equivalent states produce identical query
//! strings.

use std::fmt;

use url::form_urlencoded;

use crate::types::*;

/// Ordered query parameters, as in a browser's `URLSearchParams`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a form-urlencoded query string. A leading `?` is ignored.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Replace every value under `key` with a single one, keeping the
    /// position of the first occurrence.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.0[idx].1 = value;
                let mut seen = 0usize;
                self.0.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_string(), value.into()));
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.0.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize without the leading `?`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a leading integer the way browsers' `parseInt` does: optional
/// whitespace and sign, then digits, ignoring any trailing garbage.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(rest.len(), |(idx, _)| idx);
    let value: i64 = rest[..digits_end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// A positive `u32`, or `None` for anything missing, malformed, or < 1.
fn parse_positive(raw: Option<&str>) -> Option<u32> {
    let value = parse_leading_int(raw?)?;
    if value < 1 {
        return None;
    }
    u32::try_from(value).ok()
}

/// Rebuild table state from query parameters.
pub fn decode(params: &QueryParams, defaults: &TableDefaults) -> TableState {
    let page = parse_positive(params.get(PAGE_KEY)).unwrap_or(DEFAULT_PAGE);
    let limit = parse_positive(params.get(LIMIT_KEY)).unwrap_or(defaults.limit);
    let search = params.get(SEARCH_KEY).unwrap_or_default().to_string();
    let sort_by = params.get(SORT_BY_KEY).unwrap_or_default().to_string();
    let sort_order = params
        .get(SORT_ORDER_KEY)
        .map(SortOrder::parse_lenient)
        .unwrap_or_default();

    let mut filters = Filters::new();
    for (key, value) in params.iter() {
        if is_reserved_key(key) {
            continue;
        }
        // Last occurrence wins for repeated filter keys.
        if let Ok(key) = FilterKey::parse(key) {
            filters.set(&key, FilterValue::parse(value));
        }
    }

    TableState {
        page,
        limit,
        search,
        sort_by,
        sort_order,
        filters,
    }
}

/// Write table state as query parameters, omitting default values.
///
/// Reserved keys come first in a fixed order, then filters by key.
pub fn encode(state: &TableState, defaults: &TableDefaults) -> QueryParams {
    let mut params = QueryParams::new();

    if state.page != DEFAULT_PAGE {
        params.append(PAGE_KEY, state.page.to_string());
    }
    if state.limit != defaults.limit {
        params.append(LIMIT_KEY, state.limit.to_string());
    }
    if !state.search.is_empty() {
        params.append(SEARCH_KEY, state.search.as_str());
    }
    if !state.sort_by.is_empty() {
        params.append(SORT_BY_KEY, state.sort_by.as_str());
    }
    if state.sort_order != SortOrder::Asc {
        params.append(SORT_ORDER_KEY, state.sort_order.as_str());
    }
    for (key, value) in state.filters.iter() {
        if !value.is_empty() {
            params.append(key, value.to_query());
        }
    }

    params
}
