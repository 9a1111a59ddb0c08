//! The Synchronizer: one collection instance kept current.
//!
//! A [`Synchronizer`] owns a [`CollectionStore`], the [`Paginator`] that
//! fills it page by page, and one live subscription for its
//! (collection, filter) pair. The subscription is opened before the first
//! page is requested so no change committed after the snapshot is lost.
//!
//! Live events are applied by a background task. Page requests started
//! with [`Synchronizer::request_more`] also run in the background; the
//! consumer observes both through [`Synchronizer::snapshot`] and
//! [`Synchronizer::changes`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use rowsync_core::{FetchStatus, LiveStatus, Row};
use rowsync_store::{CollectionStore, RowCollection};
use rowsync_sync::{
    collection_fingerprint, ChangeSource, FeedEvent, FetchOutcome, Fingerprint, LiveFeed,
    PageFetcher, Paginator,
};

use crate::config::SynchronizerConfig;
use crate::error::{Result, SynchronizerError};

/// What the consumer renders.
#[derive(Debug, Clone)]
pub struct SyncSnapshot<T> {
    /// Materialized rows in display order.
    pub rows: Arc<Vec<T>>,
    pub status: FetchStatus,
    /// Message of the failed fetch while `status` is `Error`.
    pub error: Option<String>,
    pub live: LiveStatus,
    pub has_more: bool,
    /// Store revision the rows were read at or after.
    pub revision: u64,
}

impl<T> SyncSnapshot<T> {
    /// True when the live feed is lost and rows may be out of date.
    pub fn is_stale(&self) -> bool {
        self.live.is_disconnected()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct LiveState {
    /// Store epoch of the current subscription.
    epoch: u64,
    status: LiveStatus,
}

/// The real-time paginated collection synchronizer.
pub struct Synchronizer<T: Row, F, S> {
    config: SynchronizerConfig,
    store: Arc<CollectionStore<T>>,
    pager: Arc<Paginator<T, F>>,
    source: S,
    runtime: Handle,
    live: Arc<Mutex<LiveState>>,
    /// Shutdown signal of the running live pump.
    pump: Mutex<Option<oneshot::Sender<()>>>,
    /// Serializes retry and filter changes.
    lifecycle: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl<T: Row, F, S> Synchronizer<T, F, S> {
    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// The filter currently in effect.
    pub fn filter(&self) -> Option<String> {
        self.pager.filter()
    }

    pub fn store(&self) -> &Arc<CollectionStore<T>> {
        &self.store
    }

    /// Rows currently materialized.
    pub fn rows(&self) -> Arc<Vec<T>> {
        self.store.current_rows()
    }

    pub fn status(&self) -> FetchStatus {
        self.pager.status()
    }

    pub fn live_status(&self) -> LiveStatus {
        lock(&self.live).status.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot<T> {
        let view = self.pager.view();
        SyncSnapshot {
            rows: view.rows,
            status: view.status,
            error: view.error,
            live: self.live_status(),
            has_more: view.has_more,
            revision: view.revision,
        }
    }

    /// Watch the store revision. It changes whenever the rows do.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Order-independent digest of the materialized rows.
    pub fn fingerprint(&self) -> Result<Fingerprint>
    where
        T: Serialize,
    {
        Ok(collection_fingerprint(self.store.current_rows().as_slice())?)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear down: close the subscription and discard every late result.
    ///
    /// Idempotent. Also runs on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pager.close();
        self.store.close();
        self.stop_pump();
        lock(&self.live).status = LiveStatus::Closed;
        tracing::debug!(collection = %self.config.collection, "synchronizer closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SynchronizerError::Closed);
        }
        Ok(())
    }

    fn stop_pump(&self) {
        if let Some(shutdown) = lock(&self.pump).take() {
            let _ = shutdown.send(());
        }
    }
}

impl<T, F, S> Synchronizer<T, F, S>
where
    T: Row,
    F: PageFetcher<T> + 'static,
    S: ChangeSource<T>,
{
    /// Open a synchronizer: subscribe, then request the first page.
    ///
    /// The first page loads in the background; the returned synchronizer
    /// reports `Loading` until it arrives. A subscription that cannot be
    /// opened leaves the synchronizer usable with a disconnected live status.
    ///
    /// Fails with [`SynchronizerError::Runtime`] when polled outside a
    /// Tokio runtime; background work is spawned onto the current one.
    pub async fn open(config: SynchronizerConfig, fetcher: F, source: S) -> Result<Self> {
        config.validate()?;
        let runtime =
            Handle::try_current().map_err(|e| SynchronizerError::Runtime(e.to_string()))?;

        let store = Arc::new(CollectionStore::new());
        let pager = Arc::new(Paginator::new(
            config.collection.clone(),
            config.filter.clone(),
            config.page_size,
            fetcher,
            Arc::clone(&store),
        ));
        let live = Arc::new(Mutex::new(LiveState {
            epoch: store.epoch(),
            status: LiveStatus::Connecting,
        }));

        let sync = Self {
            config,
            store,
            pager,
            source,
            runtime,
            live,
            pump: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        };

        tracing::debug!(
            collection = %sync.config.collection,
            filter = ?sync.config.filter,
            page_size = sync.config.page_size,
            "opening synchronizer"
        );
        sync.connect(sync.config.filter.clone()).await;
        sync.request_more();
        Ok(sync)
    }

    /// Start loading the next page in the background.
    ///
    /// Returns false, without sending anything, while a page is in flight,
    /// after exhaustion, in the error state and after close.
    pub fn request_more(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.pager.begin() {
            Ok(ticket) => {
                let pager = Arc::clone(&self.pager);
                self.runtime.spawn(async move {
                    let outcome = pager.run(ticket).await;
                    tracing::trace!(collection = %pager.collection(), ?outcome, "background fetch finished");
                });
                true
            }
            Err(outcome) => {
                tracing::trace!(collection = %self.config.collection, ?outcome, "fetch-more not started");
                false
            }
        }
    }

    /// Load the next page and wait for it.
    pub async fn fetch_next(&self) -> FetchOutcome {
        if self.is_closed() {
            return FetchOutcome::Closed;
        }
        self.pager.fetch_next().await
    }

    /// Report the index of the last row on screen.
    ///
    /// Requests more when at most `prefetch_threshold` rows remain below it.
    /// Returns whether a fetch was started.
    pub fn notify_viewport(&self, last_visible: usize) -> bool {
        let remaining = self
            .store
            .len()
            .saturating_sub(last_visible.saturating_add(1));
        if remaining > self.config.prefetch_threshold {
            return false;
        }
        self.request_more()
    }

    /// Re-attempt the page that failed, keeping the rows already loaded.
    pub async fn resume(&self) -> FetchOutcome {
        if self.is_closed() {
            return FetchOutcome::Closed;
        }
        self.pager.resume().await
    }

    /// Clear the error, empty the collection and load the first page again.
    ///
    /// The live subscription is re-opened under the new epoch.
    pub async fn retry(&self) -> Result<FetchOutcome> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;

        self.stop_pump();
        self.pager.reset();
        tracing::debug!(collection = %self.config.collection, "retrying from the first page");
        self.connect(self.pager.filter()).await;
        Ok(self.pager.fetch_next().await)
    }

    /// Switch to a new filter: resubscribe, clear, and load the first page.
    ///
    /// Pages requested under the old filter are discarded when they land.
    pub async fn set_filter(&self, filter: Option<String>) -> Result<FetchOutcome> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;

        self.stop_pump();
        self.pager.reset_with_filter(filter.clone());
        tracing::debug!(collection = %self.config.collection, ?filter, "filter changed");
        self.connect(filter).await;
        Ok(self.pager.fetch_next().await)
    }

    /// Subscribe under the current store epoch and start the live pump.
    async fn connect(&self, filter: Option<String>) {
        let epoch = self.store.epoch();
        {
            let mut live = lock(&self.live);
            if live.status == LiveStatus::Closed {
                return;
            }
            live.epoch = epoch;
            live.status = LiveStatus::Connecting;
        }

        let subscription = match self
            .source
            .subscribe(&self.config.collection, filter.as_deref())
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(
                    collection = %self.config.collection,
                    error = %e,
                    "subscription failed"
                );
                set_live(
                    &self.live,
                    epoch,
                    LiveStatus::Disconnected {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };

        let mut slot = lock(&self.pump);
        if self.store.is_closed() || self.store.epoch() != epoch {
            tracing::debug!(
                collection = %self.config.collection,
                subscription = %subscription.id(),
                "discarding subscription opened before reset"
            );
            return;
        }

        let feed = LiveFeed::new(self.config.collection.clone(), subscription);
        tracing::debug!(
            collection = %self.config.collection,
            subscription = %feed.id(),
            epoch,
            "subscribed"
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        if let Some(previous) = slot.replace(shutdown) {
            let _ = previous.send(());
        }
        set_live(&self.live, epoch, LiveStatus::Live);
        self.runtime.spawn(pump(
            feed,
            Arc::clone(&self.store),
            Arc::clone(&self.live),
            epoch,
            shutdown_rx,
        ));
    }
}

impl<T: Row, F, S> Drop for Synchronizer<T, F, S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply live events until shutdown, disconnect, or the epoch moves on.
async fn pump<T: Row>(
    mut feed: LiveFeed<T>,
    store: Arc<CollectionStore<T>>,
    live: Arc<Mutex<LiveState>>,
    epoch: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = feed.next_event() => event,
        };

        match event {
            Some(FeedEvent::Change(event)) => {
                if let Err(e) = store.apply_live_event_at(epoch, event) {
                    tracing::debug!(subscription = %feed.id(), error = %e, "live pump stopping");
                    break;
                }
            }
            Some(FeedEvent::Disconnected(error)) => {
                let reason = error.to_string();
                set_live(&live, epoch, LiveStatus::Disconnected { reason });
                break;
            }
            None => break,
        }
    }
    feed.close();
}

/// Update the live status unless a newer subscription or close took over.
fn set_live(live: &Mutex<LiveState>, epoch: u64, status: LiveStatus) {
    let mut state = lock(live);
    if state.epoch == epoch && state.status != LiveStatus::Closed {
        state.status = status;
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
