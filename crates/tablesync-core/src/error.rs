//! Error types for table state handling.

use thiserror::Error;

/// Result type alias for table state operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors raised when building table state by hand.
///
/// Decoding a URL never fails; these only surface when a caller tries to
/// construct something the URL format cannot represent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("filter key '{0}' collides with a reserved table parameter")]
    ReservedKey(String),

    #[error("filter key must not be empty")]
    EmptyKey,
}
