//! Error types for the table state store.

use tablesync_core::TableError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when mutating table state.
///
/// Reading state never fails; only mutations that the URL format cannot
/// express are rejected, and a rejected mutation never navigates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("filter key '{0}' collides with a reserved table parameter")]
    ReservedKey(String),

    #[error("filter key must not be empty")]
    EmptyKey,
}

impl From<TableError> for StoreError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::ReservedKey(key) => StoreError::ReservedKey(key),
            TableError::EmptyKey => StoreError::EmptyKey,
        }
    }
}
