//! # Rowsync
//!
//! A client-side mirror of a server collection: snapshot pages and a live
//! change feed merged into one consistent, duplicate-free view.
//!
//! ## Overview
//!
//! A [`Synchronizer`] keeps one collection instance current:
//!
//! - **Pages**: the first page loads on open; more load on demand or when
//!   the consumer scrolls near the end ([`Synchronizer::notify_viewport`])
//! - **Live events**: inserts, updates and deletes from a subscription are
//!   applied as they arrive
//! - **Filters**: changing the filter resubscribes and starts over
//! - **Teardown**: after [`Synchronizer::close`] no late page or event is
//!   applied
//!
//! ## Key Properties
//!
//! - A primary key appears at most once in the collection, at every point
//! - A live insert and a page carrying the same row converge in either order
//! - At most one page request is in flight
//! - Failures surface as statuses on the [`SyncSnapshot`], never as panics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rowsync::{Synchronizer, SynchronizerConfig};
//! use rowsync::core::JsonRow;
//! use rowsync::sync::memory::MemoryBackend;
//!
//! async fn example() {
//!     let backend = Arc::new(MemoryBackend::<JsonRow>::new());
//!
//!     let config = SynchronizerConfig::new("leave_requests")
//!         .with_filter("status=pending")
//!         .with_page_size(20);
//!     let sync: Synchronizer<JsonRow, _, _> = Synchronizer::open(config, Arc::clone(&backend), Arc::clone(&backend))
//!         .await
//!         .unwrap();
//!
//!     let mut changes = sync.changes();
//!     while changes.changed().await.is_ok() {
//!         let snapshot = sync.snapshot();
//!         println!("{} rows, {:?}", snapshot.len(), snapshot.status);
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rowsync::core` - Rows, events, cursor and statuses
//! - `rowsync::store` - The collection store and its merge policy
//! - `rowsync::sync` - Fetcher/source contracts, live feed, paginator

pub mod config;
pub mod error;
pub mod synchronizer;

// Re-export component crates
pub use rowsync_core as core;
pub use rowsync_store as store;
pub use rowsync_sync as sync;

// Re-export main types for convenience
pub use config::SynchronizerConfig;
pub use error::{Result, SynchronizerError};
pub use synchronizer::{SyncSnapshot, Synchronizer};

// Re-export commonly used types
pub use rowsync_core::{ChangeEvent, ChangeKind, FetchStatus, JsonRow, LiveStatus, Row, RowKey};
pub use rowsync_sync::{ChangeSource, FeedFrame, FetchOutcome, PageFetcher, PageRequest};
