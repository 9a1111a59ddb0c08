//! Pagination Cursor Controller.
//!
//! The paginator owns the [`Cursor`] and is the only writer of snapshot
//! pages into the store. At most one page request is in flight.
//!
//! ```text
//! Idle ──fetch──> Loading ──ok, full page──> Idle
//!                    │    ──ok, short page─> Exhausted (terminal until reset)
//!                    └────err──────────────> Error ──retry/resume──> Loading
//! ```
//!
//! A request is split into [`Paginator::begin`], which claims the single
//! in-flight slot synchronously, and [`Paginator::run`], which awaits the
//! fetcher and merges the result. Callers that must not block (a render
//! loop) can begin inline and spawn the rest.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rowsync_core::{Cursor, FetchStatus, Row};
use rowsync_store::{CollectionStore, RowCollection};

use crate::error::Result;
use crate::feed::PageRequest;
use crate::source::PageFetcher;

/// Result of a fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was merged.
    Loaded {
        appended: usize,
        discarded: usize,
        has_more: bool,
    },
    /// Another request is in flight; nothing was sent.
    AlreadyLoading,
    /// The collection is exhausted; nothing was sent.
    NoMore,
    /// The last request failed; only retry or resume leaves this state.
    Blocked { error: String },
    /// The request failed; the cursor did not move.
    Failed { error: String },
    /// The result arrived after a reset or close and was thrown away.
    Discarded,
    /// The paginator is closed; nothing was sent.
    Closed,
}

impl FetchOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, FetchOutcome::Loaded { .. })
    }
}

/// A claimed in-flight slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub request: PageRequest,
    /// Store epoch when the request was issued.
    pub epoch: u64,
}

/// Fetch state and the rows it describes, read together.
#[derive(Debug, Clone)]
pub struct PagerView<T> {
    pub status: FetchStatus,
    pub error: Option<String>,
    pub has_more: bool,
    pub rows: Arc<Vec<T>>,
    /// Store revision the rows were read at or after.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading { epoch: u64 },
    Error(String),
}

struct PagerState {
    cursor: Cursor,
    phase: Phase,
    closed: bool,
}

impl PagerState {
    fn status(&self) -> FetchStatus {
        match &self.phase {
            Phase::Loading { .. } => FetchStatus::Loading,
            Phase::Error(_) => FetchStatus::Error,
            Phase::Idle if self.cursor.is_exhausted() => FetchStatus::Exhausted,
            Phase::Idle => FetchStatus::Idle,
        }
    }

    fn last_error(&self) -> Option<String> {
        match &self.phase {
            Phase::Error(error) => Some(error.clone()),
            _ => None,
        }
    }
}

/// The pagination driver for one collection instance.
pub struct Paginator<T: Row, F> {
    collection: String,
    fetcher: F,
    store: Arc<CollectionStore<T>>,
    state: Mutex<PagerState>,
}

impl<T: Row, F> Paginator<T, F> {
    /// Create an idle paginator positioned before the first page.
    pub fn new(
        collection: impl Into<String>,
        filter: Option<String>,
        page_size: usize,
        fetcher: F,
        store: Arc<CollectionStore<T>>,
    ) -> Self {
        Self {
            collection: collection.into(),
            fetcher,
            store,
            state: Mutex::new(PagerState {
                cursor: Cursor::new(page_size.max(1), filter),
                phase: Phase::Idle,
                closed: false,
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<CollectionStore<T>> {
        &self.store
    }

    /// A copy of the cursor.
    pub fn cursor(&self) -> Cursor {
        self.lock().cursor.clone()
    }

    pub fn filter(&self) -> Option<String> {
        self.lock().cursor.filter.clone()
    }

    pub fn status(&self) -> FetchStatus {
        self.lock().status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error()
    }

    /// Status, cursor and rows under the paginator lock.
    ///
    /// Pages are merged under the same lock, so the view never pairs a
    /// settled status with the rows from before its page.
    pub fn view(&self) -> PagerView<T> {
        let state = self.lock();
        let revision = self.store.revision();
        PagerView {
            status: state.status(),
            error: state.last_error(),
            has_more: state.cursor.has_more,
            rows: self.store.current_rows(),
            revision,
        }
    }

    /// Clear the store and rewind the cursor.
    ///
    /// Any request in flight is abandoned: its result will be discarded.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.cursor.reset();
        state.phase = Phase::Idle;
        self.store.reset();
        tracing::debug!(collection = %self.collection, epoch = self.store.epoch(), "paginator reset");
    }

    /// Like [`Paginator::reset`], switching to a new filter.
    pub fn reset_with_filter(&self, filter: Option<String>) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.cursor.reset_with_filter(filter);
        state.phase = Phase::Idle;
        self.store.reset();
        tracing::debug!(
            collection = %self.collection,
            filter = ?state.cursor.filter,
            epoch = self.store.epoch(),
            "paginator reset with new filter"
        );
    }

    /// Stop issuing requests and discard any result still in flight.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.phase = Phase::Idle;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn start(&self, state: &mut PagerState) -> FetchTicket {
        let epoch = self.store.epoch();
        state.phase = Phase::Loading { epoch };
        let request = PageRequest {
            collection: self.collection.clone(),
            filter: state.cursor.filter.clone(),
            offset: state.cursor.offset(),
            limit: state.cursor.page_size,
        };
        tracing::debug!(
            collection = %self.collection,
            offset = request.offset,
            limit = request.limit,
            epoch,
            "requesting page"
        );
        FetchTicket { request, epoch }
    }

    fn lock(&self) -> MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Row, F: PageFetcher<T>> Paginator<T, F> {
    /// Fetch and merge the next page.
    pub async fn fetch_next(&self) -> FetchOutcome {
        match self.begin() {
            Ok(ticket) => self.run(ticket).await,
            Err(outcome) => outcome,
        }
    }

    /// Claim the in-flight slot for the next page.
    ///
    /// Fails with the outcome to report when no request should be sent.
    pub fn begin(&self) -> std::result::Result<FetchTicket, FetchOutcome> {
        let mut state = self.lock();
        if state.closed {
            return Err(FetchOutcome::Closed);
        }
        match &state.phase {
            Phase::Loading { .. } => return Err(FetchOutcome::AlreadyLoading),
            Phase::Error(error) => {
                return Err(FetchOutcome::Blocked {
                    error: error.clone(),
                })
            }
            Phase::Idle => {}
        }
        if state.cursor.is_exhausted() {
            return Err(FetchOutcome::NoMore);
        }
        Ok(self.start(&mut state))
    }

    /// Send the request of `ticket` and merge the response.
    pub async fn run(&self, ticket: FetchTicket) -> FetchOutcome {
        let result = self.fetcher.fetch(ticket.request.clone()).await;
        self.complete(ticket, result)
    }

    /// Re-attempt the page that failed, keeping the rows already merged.
    pub async fn resume(&self) -> FetchOutcome {
        let ticket = {
            let mut state = self.lock();
            if state.closed {
                return FetchOutcome::Closed;
            }
            let phase = state.phase.clone();
            match phase {
                Phase::Error(_) => {
                    state.phase = Phase::Idle;
                    if state.cursor.is_exhausted() {
                        return FetchOutcome::NoMore;
                    }
                    self.start(&mut state)
                }
                Phase::Loading { .. } => return FetchOutcome::AlreadyLoading,
                Phase::Idle if state.cursor.is_exhausted() => return FetchOutcome::NoMore,
                Phase::Idle => self.start(&mut state),
            }
        };
        self.run(ticket).await
    }

    /// Clear the error, empty the store and fetch the first page again.
    pub async fn retry(&self) -> FetchOutcome {
        self.reset();
        self.fetch_next().await
    }

    fn complete(&self, ticket: FetchTicket, result: Result<Vec<T>>) -> FetchOutcome {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!(collection = %self.collection, "discarding page after close");
            return FetchOutcome::Discarded;
        }
        if state.phase != (Phase::Loading { epoch: ticket.epoch }) {
            tracing::debug!(
                collection = %self.collection,
                epoch = ticket.epoch,
                "discarding page from before reset"
            );
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(rows) => {
                let len = rows.len();
                match self.store.apply_snapshot_page_at(ticket.epoch, rows) {
                    Ok(summary) => {
                        let has_more = state.cursor.record_page(len);
                        state.phase = Phase::Idle;
                        FetchOutcome::Loaded {
                            appended: summary.appended,
                            discarded: summary.discarded + summary.malformed,
                            has_more,
                        }
                    }
                    Err(e) => {
                        state.phase = Phase::Idle;
                        tracing::debug!(collection = %self.collection, error = %e, "store refused page");
                        FetchOutcome::Discarded
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(
                    collection = %self.collection,
                    offset = ticket.request.offset,
                    %error,
                    "page fetch failed"
                );
                state.phase = Phase::Error(error.clone());
                FetchOutcome::Failed { error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::MemoryBackend;
    use rowsync_core::JsonRow;
    use proptest::prelude::*;
    use rowsync_store::RowCollectionExt;
    use serde_json::json;

    fn row(id: i64) -> JsonRow {
        JsonRow::new(json!({ "id": id })).unwrap()
    }

    type Pager = Paginator<JsonRow, Arc<MemoryBackend<JsonRow>>>;

    fn setup(rows: i64, page_size: usize) -> (Arc<MemoryBackend<JsonRow>>, Pager) {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed("tickets", (1..=rows).map(row));
        let store = Arc::new(CollectionStore::new());
        let pager = Paginator::new("tickets", None, page_size, Arc::clone(&backend), store);
        (backend, pager)
    }

    fn ids(pager: &Pager) -> Vec<String> {
        pager.store().keys().iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let (backend, pager) = setup(5, 2);

        assert_eq!(
            pager.fetch_next().await,
            FetchOutcome::Loaded { appended: 2, discarded: 0, has_more: true }
        );
        assert_eq!(pager.status(), FetchStatus::Idle);
        pager.fetch_next().await;
        assert_eq!(
            pager.fetch_next().await,
            FetchOutcome::Loaded { appended: 1, discarded: 0, has_more: false }
        );
        assert_eq!(pager.status(), FetchStatus::Exhausted);
        assert_eq!(ids(&pager), vec!["5", "4", "3", "2", "1"]);

        assert_eq!(pager.fetch_next().await, FetchOutcome::NoMore);
        assert_eq!(backend.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_empty_page() {
        let (backend, pager) = setup(4, 2);
        pager.fetch_next().await;
        pager.fetch_next().await;
        assert_eq!(pager.status(), FetchStatus::Idle);
        assert_eq!(
            pager.fetch_next().await,
            FetchOutcome::Loaded { appended: 0, discarded: 0, has_more: false }
        );
        assert_eq!(backend.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (backend, pager) = setup(5, 2);
        let ticket = pager.begin().unwrap();
        assert_eq!(pager.status(), FetchStatus::Loading);
        assert_eq!(pager.begin(), Err(FetchOutcome::AlreadyLoading));
        assert_eq!(pager.fetch_next().await, FetchOutcome::AlreadyLoading);

        assert!(pager.run(ticket).await.is_loaded());
        assert_eq!(backend.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_offset() {
        let (backend, pager) = setup(5, 2);
        pager.fetch_next().await;

        backend.fail_next_fetch("connection reset");
        assert_eq!(
            pager.fetch_next().await,
            FetchOutcome::Failed { error: "fetch failed: connection reset".into() }
        );
        assert_eq!(pager.status(), FetchStatus::Error);
        assert!(pager.cursor().has_more);
        assert_eq!(pager.cursor().offset(), 2);
        assert!(matches!(pager.fetch_next().await, FetchOutcome::Blocked { .. }));

        let outcome = pager.resume().await;
        assert_eq!(outcome, FetchOutcome::Loaded { appended: 2, discarded: 0, has_more: true });
        assert_eq!(ids(&pager), vec!["5", "4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_retry_starts_over() {
        let (backend, pager) = setup(5, 2);
        backend.fail_next_fetch("timeout");
        pager.fetch_next().await;
        assert_eq!(pager.last_error().as_deref(), Some("fetch failed: timeout"));

        assert!(pager.retry().await.is_loaded());
        assert_eq!(pager.last_error(), None);
        assert_eq!(pager.cursor().pages_fetched, 1);
        assert_eq!(ids(&pager), vec!["5", "4"]);
    }

    #[tokio::test]
    async fn test_result_after_reset_discarded() {
        let (_backend, pager) = setup(5, 2);
        let ticket = pager.begin().unwrap();
        pager.reset_with_filter(Some("other".into()));

        assert_eq!(pager.run(ticket).await, FetchOutcome::Discarded);
        assert!(pager.store().is_empty());
        assert_eq!(pager.status(), FetchStatus::Idle);
        assert_eq!(pager.cursor().pages_fetched, 0);
        assert_eq!(pager.filter().as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_result_after_close_discarded() {
        let (_backend, pager) = setup(5, 2);
        let ticket = pager.begin().unwrap();
        pager.close();
        pager.store().close();

        assert_eq!(pager.run(ticket).await, FetchOutcome::Discarded);
        assert!(pager.store().is_empty());
        assert_eq!(pager.fetch_next().await, FetchOutcome::Closed);
    }

    #[tokio::test]
    async fn test_view_reads_status_and_rows_together() {
        let (_backend, pager) = setup(3, 2);
        let ticket = pager.begin().unwrap();
        let view = pager.view();
        assert_eq!(view.status, FetchStatus::Loading);
        assert!(view.rows.is_empty());

        pager.run(ticket).await;
        let view = pager.view();
        assert_eq!(view.status, FetchStatus::Idle);
        assert!(view.has_more);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.error, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_view_never_shows_exhaustion_without_last_page() {
        let (_backend, pager) = setup(41, 2);
        let pager = Arc::new(pager);

        let reader = {
            let pager = Arc::clone(&pager);
            tokio::spawn(async move {
                loop {
                    let view = pager.view();
                    if view.status != FetchStatus::Loading {
                        assert_eq!(view.has_more, view.rows.len() < 41, "{:?}", view.status);
                    }
                    if view.status == FetchStatus::Exhausted {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        while pager.fetch_next().await.is_loaded() {
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
        assert_eq!(pager.store().len(), 41);
    }

    proptest! {
        #[test]
        fn test_paging_exhausts_once(seeded in 0i64..30, page_size in 1usize..7) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (backend, pager) = setup(seeded, page_size);

            runtime.block_on(async {
                let mut seen_short = false;
                for _ in 0..(seeded as usize / page_size + 2) {
                    match pager.fetch_next().await {
                        FetchOutcome::Loaded { appended, has_more, .. } => {
                            prop_assert!(!seen_short);
                            seen_short = appended < page_size;
                            prop_assert_eq!(has_more, !seen_short);
                        }
                        FetchOutcome::NoMore => prop_assert!(seen_short),
                        other => prop_assert!(false, "unexpected {:?}", other),
                    }
                    prop_assert_eq!(pager.cursor().has_more, !seen_short);
                    prop_assert_eq!(pager.status() == FetchStatus::Exhausted, seen_short);
                }
                Ok(())
            })?;

            prop_assert_eq!(pager.store().len(), seeded as usize);
            prop_assert_eq!(backend.fetch_calls(), seeded as u64 / page_size as u64 + 1);
        }
    }
}
