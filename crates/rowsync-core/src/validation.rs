//! Validation of incoming events and configuration values.
//!
//! Row shape beyond the primary key is not checked; a row with a transient
//! null field is applied as-is.

use crate::error::CoreError;
use crate::event::ChangeEvent;
use crate::row::Row;

/// Check that an event can be merged and return its key.
pub fn validate_event<T: Row>(event: &ChangeEvent<T>) -> Result<T::Key, CoreError> {
    event.row.require_key()
}

/// Page sizes must be at least one row.
pub fn validate_page_size(page_size: usize) -> Result<(), CoreError> {
    if page_size == 0 {
        return Err(CoreError::InvalidPageSize(page_size));
    }
    Ok(())
}
