//! Query execution primitives the scheduler drives.
//!
//! A [`Query`] wraps an async fetch function and publishes its latest
//! [`QueryResult`]. It does no caching of its own beyond the last result.

mod debounced;
mod dependent;
mod fetcher;
mod paginated;
mod parallel;
mod query;
mod resource;

pub use debounced::{Debounced, DEFAULT_DEBOUNCE};
pub use dependent::Dependent;
#[cfg(feature = "http")]
pub use fetcher::{fetch_json, HttpFetcher};
pub use fetcher::Fetcher;
pub use paginated::{PageOptions, Paginated};
pub use parallel::ParallelQueries;
pub use query::{Query, QueryResult, QueryStatus, Refetch};
pub use resource::Resource;
