//! # Rowsync Sync
//!
//! The moving parts around the collection store: fetching snapshot pages,
//! consuming the live change feed, and driving pagination.
//!
//! ## Overview
//!
//! Two external collaborators feed one [`CollectionStore`]:
//!
//! - A [`PageFetcher`] returns slices of the collection, newest first, by
//!   offset and limit.
//! - A [`ChangeSource`] opens a [`Subscription`] delivering native
//!   [`FeedFrame`]s for rows matching a filter.
//!
//! [`LiveFeed`] translates frames into insert/update/delete events.
//! [`Paginator`] owns the cursor and allows one page request in flight.
//!
//! ## Key Properties
//!
//! - **Single flight**: a second fetch request while one is in flight is a
//!   no-op
//! - **Commutative**: a live insert and a page carrying the same row
//!   converge to one entry in either order
//! - **Epoch-guarded**: pages fetched before a reset are discarded
//! - **Quiet after close**: no event or page is applied after teardown
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rowsync_core::JsonRow;
//! use rowsync_store::{CollectionStore, RowCollection};
//! use rowsync_sync::{memory::MemoryBackend, Paginator};
//!
//! async fn example() {
//!     let backend = Arc::new(MemoryBackend::<JsonRow>::new());
//!     let store = Arc::new(CollectionStore::new());
//!     let pager = Paginator::new("tickets", None, 20, backend, Arc::clone(&store));
//!
//!     let outcome = pager.fetch_next().await;
//!     println!("{:?}: {} rows", outcome, store.len());
//! }
//! ```
//!
//! [`CollectionStore`]: rowsync_store::CollectionStore

pub mod convergence;
pub mod error;
pub mod feed;
pub mod live;
pub mod paginator;
pub mod source;

pub use convergence::{collection_fingerprint, verify_convergence, ConvergenceResult, Fingerprint};
pub use error::{Result, SyncError};
pub use feed::{limits, ChangeTypeRaw, FeedFrame, PageRequest, SubscriptionId};
pub use live::{FeedEvent, LiveFeed};
pub use paginator::{FetchOutcome, FetchTicket, PagerView, Paginator};
pub use source::{memory, ChangeSource, PageFetcher, Subscription};
