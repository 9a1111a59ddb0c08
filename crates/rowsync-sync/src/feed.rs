//! Native change-feed frames and page requests.
//!
//! A backing store's change feed speaks [`FeedFrame`]s. Frames are richer
//! and looser than the insert/update/delete events the collection store
//! consumes; [`FeedFrame::into_event`] does the narrowing.

use serde::{Deserialize, Serialize};
use std::fmt;

use rowsync_core::{validate_event, ChangeEvent, ChangeKind, CoreError, JsonRow, Row};

use crate::error::SyncError;

/// Identifier of one open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Generate a random subscription ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{:016x}", self.0)
    }
}

/// Channel and batch limits.
pub mod limits {
    /// Frames buffered per subscription before the producer drops it.
    pub const DEFAULT_EVENT_BUFFER: usize = 1024;
    /// Rows per page when nothing else is configured.
    pub const DEFAULT_PAGE_SIZE: usize = 20;
}

/// Change type as the feed spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTypeRaw {
    Insert,
    Update,
    Delete,
    /// Anything this client does not understand.
    #[serde(other)]
    Unknown,
}

impl ChangeTypeRaw {
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            ChangeTypeRaw::Insert => Some(ChangeKind::Insert),
            ChangeTypeRaw::Update => Some(ChangeKind::Update),
            ChangeTypeRaw::Delete => Some(ChangeKind::Delete),
            ChangeTypeRaw::Unknown => None,
        }
    }
}

impl From<ChangeKind> for ChangeTypeRaw {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Insert => ChangeTypeRaw::Insert,
            ChangeKind::Update => ChangeTypeRaw::Update,
            ChangeKind::Delete => ChangeTypeRaw::Delete,
        }
    }
}

/// One frame of a change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub enum FeedFrame<T> {
    /// A row-level change.
    Change {
        change_type: ChangeTypeRaw,
        #[serde(default)]
        row: Option<T>,
    },

    /// Keepalive; carries nothing.
    Heartbeat,

    /// The feed failed server-side and will deliver nothing more.
    Error { message: String },
}

impl<T> FeedFrame<T> {
    /// A change frame for `event`.
    pub fn change(event: ChangeEvent<T>) -> Self {
        FeedFrame::Change {
            change_type: event.kind.into(),
            row: Some(event.row),
        }
    }
}

impl<T: Row> FeedFrame<T> {
    /// Narrow a frame to a change event.
    ///
    /// Heartbeats yield `Ok(None)`. Error frames yield
    /// [`SyncError::Subscription`]. Unknown change types, missing rows and
    /// rows without a primary key are malformed.
    pub fn into_event(self) -> Result<Option<ChangeEvent<T>>, SyncError> {
        match self {
            FeedFrame::Change { change_type, row } => {
                let kind = change_type.kind().ok_or_else(|| {
                    SyncError::InvalidFrame("unknown change type".to_string())
                })?;
                let row = row.ok_or(CoreError::MissingRow)?;
                let event = ChangeEvent::new(kind, row);
                validate_event(&event)?;
                Ok(Some(event))
            }
            FeedFrame::Heartbeat => Ok(None),
            FeedFrame::Error { message } => Err(SyncError::Subscription(message)),
        }
    }
}

impl<T: for<'de> Deserialize<'de>> FeedFrame<T> {
    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidFrame(e.to_string()))
    }
}

impl FeedFrame<JsonRow> {
    /// Parse a JSON text frame whose rows are keyed by `key_field`.
    ///
    /// [`FeedFrame::from_json`] binds rows to `"id"`.
    pub fn from_json_keyed(text: &str, key_field: &str) -> Result<Self, SyncError> {
        Ok(Self::from_json(text)?.keyed_by(key_field))
    }

    /// Rebind the carried row to `key_field`.
    pub fn keyed_by(self, key_field: &str) -> Self {
        match self {
            FeedFrame::Change { change_type, row } => FeedFrame::Change {
                change_type,
                row: row.map(|row| row.with_key_field(key_field)),
            },
            other => other,
        }
    }
}

/// A request for one snapshot page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub collection: String,
    pub filter: Option<String>,
    pub offset: u64,
    pub limit: usize,
}
