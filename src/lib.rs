//! # Stowage
//!
//! Observable state containers with undo/redo history, plus timer-driven
//! query refetching.
//!
//! ## Store (state management)
//!
//! - `Store<T>` - Shared state container with partial updates, structural
//!   change detection, linear undo/redo history and keyed persistence
//! - `Binding<T, R>` - A selector over a store that only reports distinct
//!   selections
//! - `WatchBinding<T, R>` - A binding published on a `tokio::sync::watch`
//!   channel
//!
//! ## Schedule (refetching)
//!
//! - `Query<T>` - An async fetch function and its latest result
//! - `query::{Paginated, Debounced, Dependent, Resource}` - Wrappers for
//!   paged, debounced, dependency-driven and background fetches
//! - `Scheduler` - Refetches queries after a delay, on an interval, or on a
//!   5-field cron expression
//! - `CronRules` - The cron evaluator behind it

pub mod binding;
pub mod cron;
pub mod equality;
pub mod error;
pub mod logging;
pub mod query;
pub mod schedule;
pub mod store;

// Re-export main types for convenience
pub use binding::{select_key, Binding, WatchBinding};
pub use cron::{next_execution_after, parse_cron, CronRules};
pub use equality::{is_deep_equal, DeepEq};
pub use error::{CronError, FetchError, ScheduleError, StoreError};
pub use logging::LogOptions;
pub use query::{Query, QueryResult, QueryStatus};
pub use schedule::{ScheduleHandle, ScheduleOptions, Scheduler};
pub use store::{Store, StoreConfig, Subscription};
