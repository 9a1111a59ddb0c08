//! # Rowsync Core
//!
//! Pure primitives for rowsync: rows, primary keys, change events and the
//! pagination cursor.
//!
//! This crate contains no I/O, no locking, no async. It describes the values
//! that flow between the page fetcher, the live change feed and the
//! collection store.
//!
//! ## Key Types
//!
//! - [`Row`] - A record with exactly one primary key
//! - [`RowKey`] - Primary key of a [`JsonRow`]
//! - [`JsonRow`] - A JSON object row with a configurable key field
//! - [`ChangeEvent`] - A live insert, update or delete
//! - [`Cursor`] - Pagination bookkeeping for one collection instance
//! - [`FetchStatus`] / [`LiveStatus`] - What a consumer renders

pub mod cursor;
pub mod error;
pub mod event;
pub mod row;
pub mod validation;

pub use cursor::{Cursor, FetchStatus, LiveStatus};
pub use error::{CoreError, Result};
pub use event::{ChangeEvent, ChangeKind};
pub use row::{JsonRow, Row, RowKey, DEFAULT_KEY_FIELD};
pub use validation::{validate_event, validate_page_size};
