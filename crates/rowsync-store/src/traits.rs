//! RowCollection trait: the merge interface of the collection store.

use std::sync::Arc;

use rowsync_core::{ChangeEvent, Row};

/// Why a live event left the collection untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Insert for a key already present; the existing row wins.
    AlreadyPresent,
    /// Update or delete for a key outside the materialized window.
    NotMaterialized,
    /// The store is closed.
    Closed,
}

/// Effect of one live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Insert placed at the front.
    Prepended,
    /// Update replaced the row at this index.
    Replaced { index: usize },
    /// Delete removed the row at this index.
    Removed { index: usize },
    /// Nothing changed.
    Ignored(IgnoreReason),
    /// Row without a primary key; dropped.
    Malformed,
}

impl ApplyResult {
    /// Whether the collection changed.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ApplyResult::Prepended | ApplyResult::Replaced { .. } | ApplyResult::Removed { .. }
        )
    }
}

/// Effect of one snapshot page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSummary {
    /// Rows appended at the end.
    pub appended: usize,
    /// Rows whose key was already present.
    pub discarded: usize,
    /// Rows without a primary key.
    pub malformed: usize,
}

impl PageSummary {
    pub fn total(&self) -> usize {
        self.appended + self.discarded + self.malformed
    }
}

/// The merge interface.
///
/// Implementations take `&self` and synchronize internally so a page fetch
/// completion and a live pump can share one store. Readers get an
/// independent snapshot; mutations never show through a snapshot already
/// handed out.
pub trait RowCollection<T: Row>: Send + Sync {
    /// Merge a page, already sorted by the collection's sort key.
    fn apply_snapshot_page(&self, rows: Vec<T>) -> PageSummary;

    /// Merge one live event.
    fn apply_live_event(&self, event: ChangeEvent<T>) -> ApplyResult;

    /// The current rows.
    fn current_rows(&self) -> Arc<Vec<T>>;

    /// Drop every row and advance the epoch.
    fn reset(&self);

    /// Whether a row with this key is materialized.
    fn contains(&self, key: &T::Key) -> bool;

    /// Number of materialized rows.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extension trait for common collection patterns.
pub trait RowCollectionExt<T: Row>: RowCollection<T> {
    /// Primary keys in collection order.
    fn keys(&self) -> Vec<T::Key> {
        self.current_rows()
            .iter()
            .filter_map(|row| row.primary_key())
            .collect()
    }
}

impl<T: Row, C: RowCollection<T> + ?Sized> RowCollectionExt<T> for C {}
