//! Error types for table fetches.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for fetch operations.
pub type FetchOutcome<T> = Result<T, FetchError>;

/// Why a fetch produced no page.
///
/// Cloneable so one failed request can be handed to every caller that was
/// sharing it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) | FetchError::Other(_) => false,
        }
    }
}
