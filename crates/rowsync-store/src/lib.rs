//! # Rowsync Store
//!
//! The collection store: one materialized, de-duplicated, ordered sequence
//! of rows fed by snapshot pages and live change events.
//!
//! ## Key Types
//!
//! - [`RowCollection`] - The merge interface every store implements
//! - [`CollectionStore`] - In-memory implementation with copy-on-write reads
//! - [`ApplyResult`] - What a live event did to the collection
//! - [`PageSummary`] - What a snapshot page did to the collection
//!
//! ## Merge Policy
//!
//! - **Pages append**: rows whose key is absent go to the end; present keys
//!   keep the existing row.
//! - **Live inserts prepend**: unless the key is present, in which case the
//!   insert is ignored.
//! - **Live updates replace in place**: absent keys are ignored.
//! - **Live deletes remove**: absent keys are a no-op, never buffered.
//!
//! The presence check is the only duplication guard, so a live insert and a
//! page carrying the same row converge to one entry in either order.
//!
//! ## Epochs
//!
//! Every [`RowCollection::reset`] advances the store's epoch. Producers that
//! started under an older epoch (a page fetch issued before a filter change,
//! a live pump for a replaced subscription) use the `*_at` operations, which
//! refuse stale epochs and refuse everything once the store is closed.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::CollectionStore;
pub use traits::{ApplyResult, IgnoreReason, PageSummary, RowCollection, RowCollectionExt};
