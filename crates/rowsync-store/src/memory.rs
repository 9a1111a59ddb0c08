//! In-memory collection store.
//!
//! Rows live in an `Arc<Vec<T>>`. Readers clone the `Arc`; writers go
//! through `Arc::make_mut`, so a snapshot handed out before a mutation keeps
//! its contents.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rowsync_core::{ChangeEvent, ChangeKind, Row};
use tokio::sync::watch;

use crate::error::{Result, StoreError};
use crate::traits::{ApplyResult, IgnoreReason, PageSummary, RowCollection};

/// The collection store.
///
/// Thread-safe via RwLock. The primary key is unique across the rows at
/// every point a reader can observe.
pub struct CollectionStore<T: Row> {
    inner: RwLock<Inner<T>>,
    revision: watch::Sender<u64>,
}

struct Inner<T: Row> {
    /// Materialized rows, in collection order.
    rows: Arc<Vec<T>>,

    /// Keys of `rows`.
    keys: HashSet<T::Key>,

    /// Advanced by every reset.
    epoch: u64,

    /// Bumped on every effective mutation.
    revision: u64,

    closed: bool,
}

impl<T: Row> CollectionStore<T> {
    /// Create a new empty store at epoch 0.
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                rows: Arc::new(Vec::new()),
                keys: HashSet::new(),
                epoch: 0,
                revision: 0,
                closed: false,
            }),
            revision,
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Watch the revision counter. It changes whenever the rows do.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Close the store. Every later mutation is refused.
    pub fn close(&self) {
        let mut inner = self.write();
        if !inner.closed {
            inner.closed = true;
            tracing::debug!(rows = inner.rows.len(), "collection store closed");
        }
    }

    /// Merge a page produced under `epoch`.
    pub fn apply_snapshot_page_at(&self, epoch: u64, rows: Vec<T>) -> Result<PageSummary> {
        let mut inner = self.write();
        inner.check(epoch)?;
        let summary = inner.append_page(rows);
        if summary.appended > 0 {
            self.bump(&mut inner);
        }
        Ok(summary)
    }

    /// Merge a live event received under `epoch`.
    pub fn apply_live_event_at(&self, epoch: u64, event: ChangeEvent<T>) -> Result<ApplyResult> {
        let mut inner = self.write();
        inner.check(epoch)?;
        let result = inner.apply_event(event);
        if result.is_mutation() {
            self.bump(&mut inner);
        }
        Ok(result)
    }

    fn bump(&self, inner: &mut Inner<T>) {
        inner.revision += 1;
        self.revision.send_replace(inner.revision);
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Row> Default for CollectionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Row> Inner<T> {
    fn check(&self, epoch: u64) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if epoch != self.epoch {
            return Err(StoreError::StaleEpoch {
                expected: epoch,
                current: self.epoch,
            });
        }
        Ok(())
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.primary_key().as_ref() == Some(key))
    }

    fn append_page(&mut self, page: Vec<T>) -> PageSummary {
        let mut summary = PageSummary::default();
        let mut seen = HashSet::with_capacity(page.len());
        let mut accepted = Vec::with_capacity(page.len());

        for row in page {
            let Some(key) = row.primary_key() else {
                tracing::warn!(field = row.key_field(), "dropping page row without primary key");
                summary.malformed += 1;
                continue;
            };
            if !seen.insert(key.clone()) {
                tracing::warn!(key = ?key, "page repeats a primary key; keeping the first row");
            }
            if self.keys.contains(&key) {
                summary.discarded += 1;
                continue;
            }
            self.keys.insert(key);
            accepted.push(row);
            summary.appended += 1;
        }

        if !accepted.is_empty() {
            Arc::make_mut(&mut self.rows).extend(accepted);
        }

        tracing::debug!(
            appended = summary.appended,
            discarded = summary.discarded,
            malformed = summary.malformed,
            rows = self.rows.len(),
            "applied snapshot page"
        );
        summary
    }

    fn apply_event(&mut self, event: ChangeEvent<T>) -> ApplyResult {
        let Some(key) = event.row.primary_key() else {
            tracing::warn!(
                kind = %event.kind,
                field = event.row.key_field(),
                "dropping live event without primary key"
            );
            return ApplyResult::Malformed;
        };

        let result = match event.kind {
            ChangeKind::Insert => {
                if self.keys.contains(&key) {
                    ApplyResult::Ignored(IgnoreReason::AlreadyPresent)
                } else {
                    self.keys.insert(key.clone());
                    Arc::make_mut(&mut self.rows).insert(0, event.row);
                    ApplyResult::Prepended
                }
            }
            ChangeKind::Update => match self.position(&key) {
                Some(index) => {
                    Arc::make_mut(&mut self.rows)[index] = event.row;
                    ApplyResult::Replaced { index }
                }
                None => ApplyResult::Ignored(IgnoreReason::NotMaterialized),
            },
            ChangeKind::Delete => match self.position(&key) {
                Some(index) => {
                    Arc::make_mut(&mut self.rows).remove(index);
                    self.keys.remove(&key);
                    ApplyResult::Removed { index }
                }
                None => ApplyResult::Ignored(IgnoreReason::NotMaterialized),
            },
        };

        tracing::trace!(kind = %event.kind, key = ?key, result = ?result, "applied live event");
        result
    }
}

impl<T: Row> RowCollection<T> for CollectionStore<T> {
    fn apply_snapshot_page(&self, rows: Vec<T>) -> PageSummary {
        let mut inner = self.write();
        if inner.closed {
            tracing::debug!(rows = rows.len(), "discarding page for closed store");
            return PageSummary {
                discarded: rows.len(),
                ..PageSummary::default()
            };
        }
        let summary = inner.append_page(rows);
        if summary.appended > 0 {
            self.bump(&mut inner);
        }
        summary
    }

    fn apply_live_event(&self, event: ChangeEvent<T>) -> ApplyResult {
        let mut inner = self.write();
        if inner.closed {
            return ApplyResult::Ignored(IgnoreReason::Closed);
        }
        let result = inner.apply_event(event);
        if result.is_mutation() {
            self.bump(&mut inner);
        }
        result
    }

    fn current_rows(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.read().rows)
    }

    fn reset(&self) {
        let mut inner = self.write();
        if inner.closed {
            return;
        }
        inner.rows = Arc::new(Vec::new());
        inner.keys.clear();
        inner.epoch += 1;
        tracing::debug!(epoch = inner.epoch, "collection store reset");
        self.bump(&mut inner);
    }

    fn contains(&self, key: &T::Key) -> bool {
        self.read().keys.contains(key)
    }

    fn len(&self) -> usize {
        self.read().rows.len()
    }
}
