//! Error types for the synchronizer.

use rowsync_core::CoreError;
use rowsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during synchronizer operations.
///
/// Fetch and subscription failures are not errors here; they surface as
/// statuses on the snapshot.
#[derive(Debug, Error)]
pub enum SynchronizerError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The synchronizer was closed.
    #[error("synchronizer is closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Opened outside a Tokio runtime.
    #[error("no tokio runtime: {0}")]
    Runtime(String),
}

/// Result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SynchronizerError>;
