//! Contracts of the two external collaborators: the page fetcher and the
//! change source.
//!
//! Implementations may sit on HTTP, WebSockets, a database driver or
//! anything else. [`memory`] provides one backed by plain vectors.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use rowsync_core::Row;

use crate::error::Result;
use crate::feed::{FeedFrame, PageRequest, SubscriptionId};

/// Request/response access to snapshot pages.
///
/// Rows come back sorted by the collection's sort key (newest first).
/// Fewer than `request.limit` rows means the collection is exhausted.
#[async_trait]
pub trait PageFetcher<T: Row>: Send + Sync {
    async fn fetch(&self, request: PageRequest) -> Result<Vec<T>>;
}

/// Access to the live change feed.
#[async_trait]
pub trait ChangeSource<T: Row>: Send + Sync {
    /// Open a subscription for rows of `collection` matching `filter`.
    async fn subscribe(&self, collection: &str, filter: Option<&str>) -> Result<Subscription<T>>;
}

#[async_trait]
impl<T: Row, F: PageFetcher<T> + ?Sized> PageFetcher<T> for Arc<F> {
    async fn fetch(&self, request: PageRequest) -> Result<Vec<T>> {
        (**self).fetch(request).await
    }
}

#[async_trait]
impl<T: Row, S: ChangeSource<T> + ?Sized> ChangeSource<T> for Arc<S> {
    async fn subscribe(&self, collection: &str, filter: Option<&str>) -> Result<Subscription<T>> {
        (**self).subscribe(collection, filter).await
    }
}

/// An open change-feed subscription.
///
/// Frames arrive on a bounded channel in delivery order. The feed ends when
/// the producer drops its sender. Closing (or dropping) the subscription
/// signals the producer to stop.
pub struct Subscription<T> {
    id: SubscriptionId,
    frames: mpsc::Receiver<FeedFrame<T>>,
    close: Option<oneshot::Sender<()>>,
}

impl<T> Subscription<T> {
    pub fn new(
        id: SubscriptionId,
        frames: mpsc::Receiver<FeedFrame<T>>,
        close: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            frames,
            close: Some(close),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next frame, or `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<FeedFrame<T>> {
        self.frames.recv().await
    }

    /// Tell the producer to stop. Idempotent.
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
            self.frames.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_none()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// An in-memory backing store implementing both contracts.
///
/// Collections are vectors in creation order. Pages are served newest
/// first. Every write is fanned out to the open subscriptions of its
/// collection whose filter matches.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::mpsc::error::TrySendError;
    use tokio::sync::oneshot::error::TryRecvError;

    use rowsync_core::{ChangeEvent, ChangeKind};

    use crate::error::SyncError;
    use crate::feed::limits;

    /// Decides whether a row matches a filter string.
    pub type Matcher<T> = Arc<dyn Fn(&T, &str) -> bool + Send + Sync>;

    struct Subscriber<T> {
        id: SubscriptionId,
        collection: String,
        filter: Option<String>,
        frames: mpsc::Sender<FeedFrame<T>>,
        closed: oneshot::Receiver<()>,
    }

    struct BackendInner<T> {
        /// Rows per collection, oldest first.
        collections: HashMap<String, Vec<T>>,
        subscribers: Vec<Subscriber<T>>,
        /// Injected fetch failures, consumed in order.
        failures: VecDeque<String>,
        fetch_calls: u64,
        refuse_subscriptions: Option<String>,
    }

    /// In-memory backend.
    pub struct MemoryBackend<T> {
        inner: Mutex<BackendInner<T>>,
        matcher: Option<Matcher<T>>,
        buffer: usize,
    }

    impl<T: Row> MemoryBackend<T> {
        /// Create an empty backend that ignores filters.
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(BackendInner {
                    collections: HashMap::new(),
                    subscribers: Vec::new(),
                    failures: VecDeque::new(),
                    fetch_calls: 0,
                    refuse_subscriptions: None,
                }),
                matcher: None,
                buffer: limits::DEFAULT_EVENT_BUFFER,
            }
        }

        /// Evaluate filters with `matcher`.
        pub fn with_matcher<M>(mut self, matcher: M) -> Self
        where
            M: Fn(&T, &str) -> bool + Send + Sync + 'static,
        {
            self.matcher = Some(Arc::new(matcher));
            self
        }

        /// Frames buffered per subscription.
        pub fn with_buffer(mut self, buffer: usize) -> Self {
            self.buffer = buffer.max(1);
            self
        }

        /// Seed rows without notifying subscribers, oldest first.
        pub fn seed(&self, collection: &str, rows: impl IntoIterator<Item = T>) {
            self.lock()
                .collections
                .entry(collection.to_string())
                .or_default()
                .extend(rows);
        }

        /// Create a row and notify subscribers.
        pub fn insert(&self, collection: &str, row: T) {
            let mut inner = self.lock();
            inner
                .collections
                .entry(collection.to_string())
                .or_default()
                .push(row.clone());
            self.fan_out(&mut inner, collection, ChangeEvent::insert(row));
        }

        /// Replace a row and notify subscribers.
        ///
        /// Returns false if no row carries the key; nothing is emitted then.
        pub fn update(&self, collection: &str, row: T) -> bool {
            let Some(key) = row.primary_key() else {
                return false;
            };
            let mut inner = self.lock();
            let slot = inner
                .collections
                .get_mut(collection)
                .and_then(|rows| rows.iter_mut().find(|r| r.primary_key() == Some(key.clone())));
            match slot {
                Some(slot) => {
                    *slot = row.clone();
                    self.fan_out(&mut inner, collection, ChangeEvent::update(row));
                    true
                }
                None => false,
            }
        }

        /// Remove a row and notify subscribers.
        pub fn delete(&self, collection: &str, key: &T::Key) -> Option<T> {
            let mut inner = self.lock();
            let rows = inner.collections.get_mut(collection)?;
            let index = rows
                .iter()
                .position(|r| r.primary_key().as_ref() == Some(key))?;
            let row = rows.remove(index);
            self.fan_out(&mut inner, collection, ChangeEvent::delete(row.clone()));
            Some(row)
        }

        /// Push a raw frame to every subscriber of `collection`, ignoring
        /// filters.
        pub fn emit(&self, collection: &str, frame: FeedFrame<T>) {
            let mut inner = self.lock();
            inner.subscribers.retain(|sub| {
                if sub.collection != collection {
                    return true;
                }
                deliver(sub, frame.clone())
            });
        }

        /// Drop every open subscription, ending their feeds.
        pub fn disconnect_all(&self) {
            let dropped = std::mem::take(&mut self.lock().subscribers);
            tracing::debug!(count = dropped.len(), "memory backend disconnected subscribers");
        }

        /// Make the next fetch fail with `message`.
        pub fn fail_next_fetch(&self, message: impl Into<String>) {
            self.lock().failures.push_back(message.into());
        }

        /// Refuse new subscriptions with `message`, or accept again with `None`.
        pub fn refuse_subscriptions(&self, message: Option<String>) {
            self.lock().refuse_subscriptions = message;
        }

        pub fn fetch_calls(&self) -> u64 {
            self.lock().fetch_calls
        }

        /// Number of subscriptions still open.
        pub fn subscriber_count(&self) -> usize {
            let mut inner = self.lock();
            inner.subscribers.retain_mut(|sub| is_open(sub));
            inner.subscribers.len()
        }

        /// Rows of `collection`, oldest first.
        pub fn rows(&self, collection: &str) -> Vec<T> {
            self.lock()
                .collections
                .get(collection)
                .cloned()
                .unwrap_or_default()
        }

        fn matches(&self, row: &T, filter: Option<&str>) -> bool {
            match (filter, &self.matcher) {
                (Some(filter), Some(matcher)) => matcher(row, filter),
                _ => true,
            }
        }

        fn fan_out(&self, inner: &mut BackendInner<T>, collection: &str, event: ChangeEvent<T>) {
            inner.subscribers.retain_mut(|sub| {
                if !is_open(sub) {
                    return false;
                }
                if sub.collection != collection {
                    return true;
                }
                // Deletes are delivered to every subscriber: the row may have
                // left the filter before it was deleted.
                if event.kind != ChangeKind::Delete
                    && !self.matches(&event.row, sub.filter.as_deref())
                {
                    return true;
                }
                deliver(sub, FeedFrame::change(event.clone()))
            });
        }

        fn lock(&self) -> MutexGuard<'_, BackendInner<T>> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T: Row> Default for MemoryBackend<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    fn is_open<T>(sub: &mut Subscriber<T>) -> bool {
        matches!(sub.closed.try_recv(), Err(TryRecvError::Empty))
    }

    /// Send without blocking. A full or closed channel drops the subscriber.
    fn deliver<T>(sub: &Subscriber<T>, frame: FeedFrame<T>) -> bool {
        match sub.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscription = %sub.id, "subscriber lagging; dropping subscription");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    #[async_trait]
    impl<T: Row> PageFetcher<T> for MemoryBackend<T> {
        async fn fetch(&self, request: PageRequest) -> Result<Vec<T>> {
            let mut inner = self.lock();
            inner.fetch_calls += 1;
            if let Some(message) = inner.failures.pop_front() {
                return Err(SyncError::Fetch(message));
            }

            let rows = match inner.collections.get(&request.collection) {
                Some(rows) => rows,
                None => return Ok(Vec::new()),
            };
            let offset = usize::try_from(request.offset).unwrap_or(usize::MAX);
            Ok(rows
                .iter()
                .rev()
                .filter(|row| self.matches(row, request.filter.as_deref()))
                .skip(offset)
                .take(request.limit)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl<T: Row> ChangeSource<T> for MemoryBackend<T> {
        async fn subscribe(
            &self,
            collection: &str,
            filter: Option<&str>,
        ) -> Result<Subscription<T>> {
            let mut inner = self.lock();
            if let Some(message) = &inner.refuse_subscriptions {
                return Err(SyncError::Subscription(message.clone()));
            }

            let id = SubscriptionId::random();
            let (frames_tx, frames_rx) = mpsc::channel(self.buffer);
            let (close_tx, close_rx) = oneshot::channel();
            inner.subscribers.push(Subscriber {
                id,
                collection: collection.to_string(),
                filter: filter.map(str::to_string),
                frames: frames_tx,
                closed: close_rx,
            });
            tracing::debug!(subscription = %id, collection, ?filter, "memory backend subscription opened");

            Ok(Subscription::new(id, frames_rx, close_tx))
        }
    }
}
