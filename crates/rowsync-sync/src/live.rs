//! Change Event Source adapter.
//!
//! [`LiveFeed`] wraps one [`Subscription`] and yields the insert/update/
//! delete events the collection store consumes. It does not reconnect; a
//! lost feed is reported once as [`FeedEvent::Disconnected`] and the
//! consumer decides what to do.

use rowsync_core::{ChangeEvent, Row};

use crate::error::SyncError;
use crate::feed::SubscriptionId;
use crate::source::Subscription;

/// What the adapter yields.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent<T> {
    Change(ChangeEvent<T>),
    /// The feed ended or failed. Nothing follows.
    Disconnected(SyncError),
}

/// Adapter over one live subscription.
pub struct LiveFeed<T> {
    collection: String,
    subscription: Subscription<T>,
    closed: bool,
    ended: bool,
    dropped: u64,
}

impl<T: Row> LiveFeed<T> {
    pub fn new(collection: impl Into<String>, subscription: Subscription<T>) -> Self {
        Self {
            collection: collection.into(),
            subscription,
            closed: false,
            ended: false,
            dropped: 0,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Malformed frames dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next change event.
    ///
    /// Returns `None` after [`LiveFeed::close`] and after the disconnect has
    /// been reported. Frames still buffered at close are discarded.
    pub async fn next_event(&mut self) -> Option<FeedEvent<T>> {
        loop {
            if self.closed || self.ended {
                return None;
            }

            let Some(frame) = self.subscription.recv().await else {
                self.ended = true;
                tracing::warn!(
                    collection = %self.collection,
                    subscription = %self.id(),
                    "change feed ended"
                );
                return Some(FeedEvent::Disconnected(SyncError::Disconnected(
                    "stream ended".to_string(),
                )));
            };

            match frame.into_event() {
                Ok(Some(event)) => return Some(FeedEvent::Change(event)),
                Ok(None) => continue,
                Err(error @ SyncError::Subscription(_)) => {
                    self.ended = true;
                    tracing::warn!(
                        collection = %self.collection,
                        subscription = %self.id(),
                        %error,
                        "change feed failed"
                    );
                    return Some(FeedEvent::Disconnected(error));
                }
                Err(e) => {
                    self.dropped += 1;
                    tracing::warn!(
                        collection = %self.collection,
                        subscription = %self.id(),
                        error = %e,
                        "dropping malformed change frame"
                    );
                }
            }
        }
    }

    /// Close the subscription. No event is yielded afterwards.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.subscription.close();
            tracing::debug!(
                collection = %self.collection,
                subscription = %self.id(),
                dropped = self.dropped,
                "live feed closed"
            );
        }
    }
}
