//! Pagination cursor and the statuses a consumer renders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pagination bookkeeping for one synchronizer instance.
///
/// `has_more` flips to false exactly when a page comes back shorter than
/// `page_size`, and only [`Cursor::reset`] turns it back on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub page_size: usize,
    pub pages_fetched: u64,
    pub has_more: bool,
    pub filter: Option<String>,
}

impl Cursor {
    /// A fresh cursor positioned before the first page.
    pub fn new(page_size: usize, filter: Option<String>) -> Self {
        Self {
            page_size,
            pages_fetched: 0,
            has_more: true,
            filter,
        }
    }

    /// Offset of the next page to request.
    pub fn offset(&self) -> u64 {
        self.pages_fetched * self.page_size as u64
    }

    /// Record a successfully fetched page of `len` rows.
    ///
    /// Returns the new `has_more`.
    pub fn record_page(&mut self, len: usize) -> bool {
        self.pages_fetched += 1;
        if len < self.page_size {
            self.has_more = false;
        }
        self.has_more
    }

    /// Back to the first page, keeping the filter.
    pub fn reset(&mut self) {
        self.pages_fetched = 0;
        self.has_more = true;
    }

    /// Back to the first page under a new filter.
    pub fn reset_with_filter(&mut self, filter: Option<String>) {
        self.reset();
        self.filter = filter;
    }

    pub fn is_exhausted(&self) -> bool {
        !self.has_more
    }
}

/// Pagination status shown to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Loading,
    Idle,
    Error,
    Exhausted,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Loading => "loading",
            FetchStatus::Idle => "idle",
            FetchStatus::Error => "error",
            FetchStatus::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the live change subscription.
///
/// A disconnected subscription leaves the materialized rows in place; the
/// consumer sees them as stale until it calls retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LiveStatus {
    Connecting,
    Live,
    Disconnected { reason: String },
    Closed,
}

impl LiveStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, LiveStatus::Live)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, LiveStatus::Disconnected { .. })
    }
}
