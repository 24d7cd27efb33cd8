//! Observable state containers with undo/redo history.
//!
//! A [`Store`] holds one value, notifies subscribers when a committed change
//! makes it structurally different, records every commit in a linear history,
//! and can persist itself to a keyed [`BlobStore`].

mod merge;
mod persist;
mod store;

pub use merge::Merge;
pub use persist::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use store::{Rehydrate, Store, StoreConfig, StoreState, Subscription};
