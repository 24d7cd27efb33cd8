use std::fmt;
use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::FetchError;

/// A value being fetched in the background, readable before it is ready.
///
/// The fetch starts once, at construction. Until it settles
/// [`try_get`](Self::try_get) returns `None`; afterwards every read returns
/// the same value or the same error. Dropping the resource aborts an
/// unfinished fetch.
pub struct Resource<T> {
    settled: watch::Receiver<Option<Result<T, FetchError>>>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> Resource<T> {
    /// Start `fetch` on the current tokio runtime.
    pub fn spawn<Fut>(fetch: Fut) -> Self
    where
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (tx, settled) = watch::channel(None);
        let task = tokio::spawn(async move {
            let outcome = fetch.await;
            tx.send_replace(Some(outcome));
        });
        Self { settled, task }
    }

    /// `None` while the fetch is in flight.
    pub fn try_get(&self) -> Option<Result<T, FetchError>> {
        self.settled.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.settled.borrow().is_some()
    }

    /// Wait for the fetch to settle.
    pub async fn get(&self) -> Result<T, FetchError> {
        let mut settled = self.settled.clone();
        let outcome = match settled.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(FetchError::Aborted)),
            Err(_) => Err(FetchError::Aborted),
        };
        outcome
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("ready", &self.settled.borrow().is_some())
            .finish()
    }
}
