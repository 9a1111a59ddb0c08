//! Error types for the store module.

use thiserror::Error;

/// Errors returned by epoch-guarded store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store was closed; nothing more is applied.
    #[error("collection store is closed")]
    Closed,

    /// The producer started before the last reset.
    #[error("stale epoch: producer epoch {expected}, store epoch {current}")]
    StaleEpoch { expected: u64, current: u64 },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
