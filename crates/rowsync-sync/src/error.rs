//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur while fetching pages or consuming the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The page fetcher failed (network or backend).
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Opening or running the subscription failed.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// The change feed ended without an error frame.
    #[error("change feed disconnected: {0}")]
    Disconnected(String),

    /// A feed frame could not be interpreted.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Rows could not be encoded for fingerprinting.
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("store error: {0}")]
    Store(#[from] rowsync_store::StoreError),

    #[error("core error: {0}")]
    Core(#[from] rowsync_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
