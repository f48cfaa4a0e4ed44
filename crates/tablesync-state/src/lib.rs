//! tablesync-state — URL-backed table state store.
//!
//! The URL is the only copy of table state. [`TableStore`] reads it through
//! a [`Navigator`], decodes it on every access, and answers each mutation
//! with exactly one navigation carrying the re-encoded state.
//!
//! # Architecture
//!
//! [`History`] is an in-memory browser history: a stack of [`Location`]s
//! with a cursor, plus a `tokio::sync::watch` channel that announces every
//! change (push, replace, back, forward) to subscribers. Anything that
//! needs table state subscribes and re-derives it from the new location.

pub mod error;
pub mod history;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use history::{History, Location, Navigator};
pub use store::{TableField, TableStore, TableUpdate};
