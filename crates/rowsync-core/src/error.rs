//! Error types for rowsync core.

use thiserror::Error;

/// Errors raised while interpreting rows, events and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The row does not carry a usable primary key.
    #[error("row is missing primary key field '{field}'")]
    MissingPrimaryKey { field: String },

    /// A change event arrived without a row payload.
    #[error("change event carries no row")]
    MissingRow,

    /// A JSON row was built from something other than an object.
    #[error("row payload is not a JSON object")]
    NotAnObject,

    /// Page sizes must be at least one row.
    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
