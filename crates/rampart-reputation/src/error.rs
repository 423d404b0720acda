//! Error types for reputation storage.

use thiserror::Error;

/// Errors surfaced by weight and request-counter stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be read.
    #[error("store read failed: {0}")]
    ReadFailed(String),

    /// The backing store could not be written.
    #[error("store write failed: {0}")]
    WriteFailed(String),

    /// The store is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
