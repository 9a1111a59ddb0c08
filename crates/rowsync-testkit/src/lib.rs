//! # Rowsync Testkit
//!
//! Testing utilities for rowsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Scenarios**: Concrete merge sequences with their expected collection
//! - **Generators**: Proptest strategies for merge operation sequences
//! - **Fixtures**: Test rows, an in-memory backend with a name filter, and a
//!   page fetcher whose responses the test releases by hand
//!
//! ## Scenarios
//!
//! ```rust
//! use rowsync_testkit::scenarios::verify_all_scenarios;
//!
//! for (name, ok, rows) in verify_all_scenarios() {
//!     println!("{name}: {ok} {rows}");
//! }
//! ```
//!
//! ## Manual fetches
//!
//! ```rust,ignore
//! use rowsync_testkit::fixtures::{ManualFetcher, TestRow};
//!
//! let (fetcher, mut pending) = ManualFetcher::<TestRow>::new();
//! // hand `fetcher` to a paginator, then:
//! let fetch = pending.next().await.unwrap();
//! assert_eq!(fetch.request.offset, 0);
//! fetch.respond(TestRow::many(1..=2));
//! ```

pub mod fixtures;
pub mod generators;
pub mod scenarios;

pub use fixtures::{
    ids, init_tracing, name_backend, wait_for, ManualFetcher, PendingFetch, PendingFetches, TestRow,
};
pub use generators::{apply_op, MergeOp};
pub use scenarios::{all_scenarios, run_scenario, verify_all_scenarios, Scenario, Step};
