//! Synchronizer configuration.

use serde::{Deserialize, Serialize};

use rowsync_core::{validate_page_size, CoreError};
use rowsync_sync::limits;

use crate::error::{Result, SynchronizerError};

/// Configuration for one synchronizer instance.
///
/// Row keys are the row type's business. JSON frames for a collection not
/// keyed by `"id"` are parsed with `FeedFrame::from_json_keyed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchronizerConfig {
    /// Collection to mirror.
    pub collection: String,
    /// Filter predicate passed verbatim to the fetcher and the change source.
    pub filter: Option<String>,
    /// Rows per page.
    pub page_size: usize,
    /// Fetch more once the consumer sees a row this close to the end.
    pub prefetch_threshold: usize,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            collection: String::new(),
            filter: None,
            page_size: limits::DEFAULT_PAGE_SIZE,
            prefetch_threshold: 5,
        }
    }
}

impl SynchronizerConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_prefetch_threshold(mut self, threshold: usize) -> Self {
        self.prefetch_threshold = threshold;
        self
    }

    /// Load from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| SynchronizerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), CoreError> {
        if self.collection.trim().is_empty() {
            return Err(CoreError::InvalidConfig("collection name is empty".into()));
        }
        validate_page_size(self.page_size)
    }
}
