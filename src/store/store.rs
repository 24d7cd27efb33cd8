use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::merge::Merge;
use super::persist::{BlobStore, MemoryBlobStore};
use crate::equality::DeepEq;
use crate::error::StoreError;

/// Values a [`Store`] can hold.
///
/// Serialization backs both structural equality and persistence; [`Merge`]
/// gives `set_state` its partial-update semantics.
pub trait StoreState: Clone + Serialize + DeserializeOwned + Merge + Send + Sync + 'static {}

impl<T> StoreState for T where T: Clone + Serialize + DeserializeOwned + Merge + Send + Sync + 'static
{}

/// Construction-time options for a [`Store`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Record commits for undo/redo. When off, history is always the
    /// current state alone.
    pub history: bool,
    /// Target of `persist`/`rehydrate`. Each store gets a private
    /// [`MemoryBlobStore`] when unset.
    #[serde(skip)]
    pub blob_store: Option<Arc<dyn BlobStore>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history: true,
            blob_store: None,
        }
    }
}

impl StoreConfig {
    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blobs);
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("history", &self.history)
            .field("blob_store", &self.blob_store.is_some())
            .finish()
    }
}

/// Outcome of [`Store::rehydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rehydrate {
    /// The stored snapshot replaced the current state.
    Restored,
    /// Nothing stored under the key; the store is unchanged.
    Missing,
    /// The stored payload did not decode; the store is unchanged.
    Corrupt,
}

type Listener = Box<dyn Fn() + Send + Sync>;

struct ListenerEntry {
    id: u64,
    active: AtomicBool,
    callback: Listener,
}

#[derive(Default)]
struct Listeners {
    entries: Mutex<Vec<Arc<ListenerEntry>>>,
    next_id: AtomicU64,
}

impl Listeners {
    fn add(&self, callback: Listener) -> Arc<ListenerEntry> {
        let entry = Arc::new(ListenerEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback,
        });
        self.entries.lock().push(Arc::clone(&entry));
        entry
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|entry| entry.id != id);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Call every listener registered at the start of the pass.
    ///
    /// Listeners removed mid-pass are skipped; listeners added mid-pass wait
    /// for the next notification.
    fn notify(&self) {
        let snapshot = self.entries.lock().clone();
        for entry in snapshot {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)();
            }
        }
    }
}

/// Current state plus its linear history. `history[index] == state` holds
/// whenever the lock is released.
struct Timeline<T> {
    state: T,
    history: Vec<T>,
    index: usize,
}

impl<T: Clone> Timeline<T> {
    fn new(initial: T) -> Self {
        Self {
            history: vec![initial.clone()],
            state: initial,
            index: 0,
        }
    }

    fn commit(&mut self, next: T, track: bool) {
        if track {
            // Entries past the cursor belong to an abandoned redo branch.
            self.history.truncate(self.index + 1);
            self.history.push(next.clone());
            self.index = self.history.len() - 1;
        } else {
            self.history = vec![next.clone()];
            self.index = 0;
        }
        self.state = next;
    }

    fn seek(&mut self, index: usize) -> bool {
        match self.history.get(index) {
            Some(entry) if index != self.index => {
                self.state = entry.clone();
                self.index = index;
                true
            }
            _ => false,
        }
    }

    fn collapse(&mut self) {
        self.history = vec![self.state.clone()];
        self.index = 0;
    }

    fn reset(&mut self, initial: T) {
        *self = Self::new(initial);
    }
}

struct Inner<T> {
    initial: T,
    timeline: Mutex<Timeline<T>>,
    listeners: Arc<Listeners>,
    track_history: bool,
    blobs: Arc<dyn BlobStore>,
}

/// A shared, observable state container with undo/redo history.
///
/// Cloning a store yields another handle to the same state. Every mutation
/// finishes its commit before any listener runs, and listeners are invoked
/// outside the internal lock, so they may read or even mutate the store.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stowage::Store;
///
/// let store = Store::new(json!({"count": 0, "name": "test"}));
/// store.set_state(json!({"count": 1}));
/// assert_eq!(store.get_state(), json!({"count": 1, "name": "test"}));
///
/// store.undo();
/// assert_eq!(store.get_state(), json!({"count": 0, "name": "test"}));
/// ```
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T: StoreState> Store<T> {
    /// Create a store with history tracking and a private in-memory blob store.
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    pub fn with_config(initial: T, config: StoreConfig) -> Self {
        let blobs = config
            .blob_store
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new()));
        Self {
            inner: Arc::new(Inner {
                timeline: Mutex::new(Timeline::new(initial.clone())),
                initial,
                listeners: Arc::new(Listeners::default()),
                track_history: config.history,
                blobs,
            }),
        }
    }

    /// Get a clone of the current state.
    pub fn get_state(&self) -> T {
        self.inner.timeline.lock().state.clone()
    }

    /// Read the current state without cloning it.
    ///
    /// `f` runs under the store lock and must not call back into the store.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.inner.timeline.lock().state)
    }

    /// Merge `partial` onto the current state.
    ///
    /// Commits and notifies only when the merged result differs structurally
    /// from the current state. Returns whether a commit happened.
    pub fn set_state(&self, partial: T::Partial) -> bool {
        self.commit(|state| {
            let next = state.merge(partial);
            (!next.deep_eq(state)).then_some(next)
        })
    }

    /// Like [`set_state`](Self::set_state), computing the partial from a
    /// snapshot of the current state.
    pub fn set_state_with<F>(&self, updater: F) -> bool
    where
        F: FnOnce(&T) -> T::Partial,
    {
        let partial = updater(&self.get_state());
        self.set_state(partial)
    }

    /// Replace the whole state, skipping the merge. No-op when `next` is
    /// structurally equal to the current state.
    pub fn replace_all_state(&self, next: T) -> bool {
        self.commit(|state| (!next.deep_eq(state)).then_some(next))
    }

    /// Step one entry back in history. No-op at the oldest entry.
    pub fn undo(&self) -> bool {
        let moved = {
            let mut timeline = self.inner.timeline.lock();
            match timeline.index.checked_sub(1) {
                Some(prev) => timeline.seek(prev),
                None => false,
            }
        };
        if moved {
            tracing::trace!(index = self.get_history_index(), "store undo");
            self.inner.listeners.notify();
        }
        moved
    }

    /// Step one entry forward in history. No-op at the newest entry.
    pub fn redo(&self) -> bool {
        let moved = {
            let mut timeline = self.inner.timeline.lock();
            let next = timeline.index + 1;
            timeline.seek(next)
        };
        if moved {
            tracing::trace!(index = self.get_history_index(), "store redo");
            self.inner.listeners.notify();
        }
        moved
    }

    pub fn get_history_index(&self) -> usize {
        self.inner.timeline.lock().index
    }

    pub fn history_len(&self) -> usize {
        self.inner.timeline.lock().history.len()
    }

    pub fn can_undo(&self) -> bool {
        self.get_history_index() > 0
    }

    pub fn can_redo(&self) -> bool {
        let timeline = self.inner.timeline.lock();
        timeline.index + 1 < timeline.history.len()
    }

    /// Forget all history except the current state. Does not notify.
    pub fn clear_history(&self) {
        self.inner.timeline.lock().collapse();
    }

    /// Return to the construction-time state and drop all history.
    ///
    /// Listeners are always notified, even when the state was already the
    /// initial one.
    pub fn reset_state(&self) {
        self.inner
            .timeline
            .lock()
            .reset(self.inner.initial.clone());
        tracing::trace!("store reset");
        self.inner.listeners.notify();
    }

    /// Alias of [`reset_state`](Self::reset_state).
    pub fn restore_state(&self) {
        self.reset_state();
    }

    /// Serialize the current state under `key` in the blob store.
    pub fn persist(&self, key: &str) -> Result<(), StoreError> {
        let payload = self.read(|state| serde_json::to_string(state))?;
        self.inner.blobs.set(key, &payload)?;
        tracing::debug!(key, bytes = payload.len(), "store persisted");
        Ok(())
    }

    /// Load the snapshot stored under `key` and commit it unconditionally.
    ///
    /// A missing key or an undecodable payload leaves the store untouched.
    /// Only blob store failures are reported as errors.
    pub fn rehydrate(&self, key: &str) -> Result<Rehydrate, StoreError> {
        let Some(payload) = self.inner.blobs.get(key)? else {
            return Ok(Rehydrate::Missing);
        };
        let restored: T = match serde_json::from_str(&payload) {
            Ok(restored) => restored,
            Err(err) => {
                tracing::warn!(key, error = %err, "skipping corrupt persisted state");
                return Ok(Rehydrate::Corrupt);
            }
        };
        self.commit(|_| Some(restored));
        tracing::debug!(key, "store rehydrated");
        Ok(Rehydrate::Restored)
    }

    /// Register a zero-argument listener called after every commit.
    ///
    /// Dropping the returned [`Subscription`] removes the listener; call
    /// [`Subscription::detach`] to keep it for the store's lifetime.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = self.inner.listeners.add(Box::new(listener));
        Subscription {
            entry,
            registry: Arc::downgrade(&self.inner.listeners),
            detached: false,
        }
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn commit<F>(&self, next: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        let committed = {
            let mut timeline = self.inner.timeline.lock();
            match next(&timeline.state) {
                Some(next) => {
                    timeline.commit(next, self.inner.track_history);
                    tracing::trace!(index = timeline.index, "store commit");
                    true
                }
                None => false,
            }
        };
        if committed {
            self.inner.listeners.notify();
        }
        committed
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StoreState> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("history_index", &self.get_history_index())
            .field("history_len", &self.history_len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// RAII handle for a store listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    entry: Arc<ListenerEntry>,
    registry: Weak<Listeners>,
    detached: bool,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if self.entry.active.swap(false, Ordering::AcqRel) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.entry.id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.entry.active.load(Ordering::Acquire)
    }

    /// Keep the listener registered after this handle is gone.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .field("active", &self.is_active())
            .finish()
    }
}
