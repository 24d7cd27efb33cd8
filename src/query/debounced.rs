use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::query::{Query, QueryResult};

/// Quiet period used by [`Debounced::new`].
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Holds a query back until its inputs stop changing.
///
/// A timer starts at construction and restarts on every
/// [`trigger`](Self::trigger). When it runs out the query is marked settled
/// and refetched. Retriggering does not cancel a fetch that already started;
/// dropping the wrapper does.
pub struct Debounced<T> {
    query: Query<T>,
    delay: Duration,
    settled: Arc<AtomicBool>,
    root: CancellationToken,
    pending: Mutex<CancellationToken>,
}

impl<T: Clone + Send + Sync + 'static> Debounced<T> {
    pub fn new(query: Query<T>) -> Self {
        Self::with_delay(query, DEFAULT_DEBOUNCE)
    }

    /// Start the first timer on the current tokio runtime.
    pub fn with_delay(query: Query<T>, delay: Duration) -> Self {
        let root = CancellationToken::new();
        let debounced = Self {
            query,
            delay,
            settled: Arc::new(AtomicBool::new(false)),
            pending: Mutex::new(root.child_token()),
            root,
        };
        debounced.trigger();
        debounced
    }

    /// Restart the timer after an input change.
    pub fn trigger(&self) {
        let timer = self.root.child_token();
        let previous = std::mem::replace(&mut *self.pending.lock(), timer.clone());
        previous.cancel();
        self.settled.store(false, Ordering::Release);

        let query = self.query.clone();
        let settled = Arc::clone(&self.settled);
        let root = self.root.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    settled.store(true, Ordering::Release);
                    tracing::trace!(key = query.key(), "debounce settled");
                    tokio::select! {
                        _ = root.cancelled() => {}
                        _ = query.refetch() => {}
                    }
                }
            }
        });
    }

    /// Drop the pending timer without fetching.
    pub fn cancel(&self) {
        self.pending.lock().cancel();
    }

    /// The last timer ran out and no trigger came after it.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn result(&self) -> QueryResult<T> {
        self.query.result()
    }

    pub fn query(&self) -> &Query<T> {
        &self.query
    }
}

impl<T> Drop for Debounced<T> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl<T> fmt::Debug for Debounced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("query", &self.query)
            .field("delay", &self.delay)
            .field("settled", &self.settled.load(Ordering::Acquire))
            .finish()
    }
}
