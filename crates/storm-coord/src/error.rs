//! Error types for the coordination store.

use thiserror::Error;

use crate::store::Version;

/// Result type alias for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during coordination store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or has been closed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("node does not exist: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("version mismatch at {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: Version,
        actual: Version,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
