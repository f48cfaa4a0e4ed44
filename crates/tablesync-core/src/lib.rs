//! tablesync-core — table state, URL query codec, and configuration.
//!
//! A [`TableState`] is the canonical description of what a server-driven
//! table shows: page, page size, free-text search, sort, and an open set of
//! filters. The [`codec`] module maps it to and from URL query parameters so
//! that the URL alone can reproduce the view.

pub mod codec;
pub mod config;
pub mod error;
pub mod pagination;
pub mod types;

pub use codec::{QueryParams, decode, encode};
pub use config::SyncConfig;
pub use error::{TableError, TableResult};
pub use pagination::PageWindow;
pub use types::*;
