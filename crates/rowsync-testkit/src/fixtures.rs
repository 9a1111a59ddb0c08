//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use rowsync_core::Row;
use rowsync_sync::memory::MemoryBackend;
use rowsync_sync::{PageFetcher, PageRequest, Result, SyncError};

/// A row keyed by `id`, with one optional payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TestRow {
    pub fn new(id: u64) -> Self {
        Self { id: Some(id), name: None }
    }

    pub fn named(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
        }
    }

    /// A row without a primary key.
    pub fn keyless(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn many(ids: impl IntoIterator<Item = u64>) -> Vec<Self> {
        ids.into_iter().map(Self::new).collect()
    }
}

impl Row for TestRow {
    type Key = u64;

    fn primary_key(&self) -> Option<u64> {
        self.id
    }
}

/// Keys of `rows` in order, skipping keyless rows.
pub fn ids(rows: &[TestRow]) -> Vec<u64> {
    rows.iter().filter_map(|row| row.id).collect()
}

/// An in-memory backend whose filters have the form `name=<value>`.
///
/// Any other filter string matches every row.
pub fn name_backend() -> Arc<MemoryBackend<TestRow>> {
    Arc::new(
        MemoryBackend::new().with_matcher(|row: &TestRow, filter: &str| {
            match filter.strip_prefix("name=") {
                Some(name) => row.name.as_deref() == Some(name),
                None => true,
            }
        }),
    )
}

/// A page request waiting for the test to answer it.
pub struct PendingFetch<T> {
    pub request: PageRequest,
    respond: oneshot::Sender<Result<Vec<T>>>,
}

impl<T> PendingFetch<T> {
    /// Resolve with `rows`. False if the requester is gone.
    pub fn respond(self, rows: Vec<T>) -> bool {
        self.respond.send(Ok(rows)).is_ok()
    }

    /// Fail with a fetch error.
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.respond
            .send(Err(SyncError::Fetch(message.into())))
            .is_ok()
    }
}

/// The test's end of a [`ManualFetcher`].
pub struct PendingFetches<T> {
    requests: mpsc::UnboundedReceiver<PendingFetch<T>>,
}

impl<T> PendingFetches<T> {
    /// Next request, waiting up to two seconds.
    pub async fn next(&mut self) -> Option<PendingFetch<T>> {
        tokio::time::timeout(Duration::from_secs(2), self.requests.recv())
            .await
            .ok()
            .flatten()
    }

    /// A request already sent, without waiting.
    pub fn try_next(&mut self) -> Option<PendingFetch<T>> {
        self.requests.try_recv().ok()
    }
}

/// A page fetcher whose requests the test resolves by hand.
///
/// Each fetch parks until the matching [`PendingFetch`] is answered, which
/// lets a test interleave live events with an in-flight page.
pub struct ManualFetcher<T> {
    requests: mpsc::UnboundedSender<PendingFetch<T>>,
    calls: Arc<AtomicU64>,
}

impl<T: Row> ManualFetcher<T> {
    pub fn new() -> (Self, PendingFetches<T>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            requests,
            calls: Arc::new(AtomicU64::new(0)),
        };
        (fetcher, PendingFetches { requests: rx })
    }

    /// Fetches issued so far, across all clones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T> Clone for ManualFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            calls: Arc::clone(&self.calls),
        }
    }
}

#[async_trait]
impl<T: Row> PageFetcher<T> for ManualFetcher<T> {
    async fn fetch(&self, request: PageRequest) -> Result<Vec<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (respond, response) = oneshot::channel();
        self.requests
            .send(PendingFetch { request, respond })
            .map_err(|_| SyncError::Fetch("fetch queue closed".into()))?;
        response
            .await
            .map_err(|_| SyncError::Fetch("fetch abandoned".into()))?
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Send `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
