//! tablesync-query — fetching pages for URL-driven tables.
//!
//! [`TableQuery`] keys every request by the full table state, shares
//! concurrent identical requests, keeps the previous page on screen while
//! the next one loads and never lets a late response overwrite a newer
//! view. [`ServerTable`] wires a query to a URL store and a debounced search
//! input.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod table;

pub use cache::{CacheConfig, CacheStats, QueryCache};
pub use error::{FetchError, FetchOutcome};
pub use fetcher::{Fetcher, HttpFetcher, request_params};
pub use orchestrator::{
    QueryOptions, QuerySnapshot, SharedFetch, TableQuery, ViewStatus, query_key,
};
pub use table::{ServerTable, ServerTableOptions};
