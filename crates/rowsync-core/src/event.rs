//! Live change events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::row::Row;

/// The three row-level changes a live feed delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live change to one row.
///
/// For deletes only the row's primary key is consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    pub row: T,
}

impl<T> ChangeEvent<T> {
    pub fn new(kind: ChangeKind, row: T) -> Self {
        Self { kind, row }
    }

    pub fn insert(row: T) -> Self {
        Self::new(ChangeKind::Insert, row)
    }

    pub fn update(row: T) -> Self {
        Self::new(ChangeKind::Update, row)
    }

    pub fn delete(row: T) -> Self {
        Self::new(ChangeKind::Delete, row)
    }
}

impl<T: Row> ChangeEvent<T> {
    /// Primary key of the affected row, if it has one.
    pub fn key(&self) -> Option<T::Key> {
        self.row.primary_key()
    }
}
