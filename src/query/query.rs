use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::error::FetchError;

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// Lifecycle of a query's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No fetch has completed yet.
    Pending,
    Success,
    Error,
}

/// Snapshot of a query after its latest fetch.
///
/// A failed refetch keeps the last successful `data` next to the new error.
/// When refetches overlap, only the most recently started one that has
/// finished decides `data`, `status` and `error`.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<FetchError>,
    /// At least one refetch is in flight.
    pub is_fetching: bool,
    /// Completed fetches, successful or not.
    pub fetch_count: u64,
    in_flight: usize,
    applied: u64,
}

impl<T> QueryResult<T> {
    fn pending() -> Self {
        Self {
            data: None,
            status: QueryStatus::Pending,
            error: None,
            is_fetching: false,
            fetch_count: 0,
            in_flight: 0,
            applied: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

/// The refetch entry point a scheduler needs from a query.
pub trait Refetch: Send + Sync + 'static {
    /// Re-run the underlying fetch and publish its outcome.
    fn refetch(&self) -> BoxFuture<'static, ()>;

    /// Whether the owner should run the initial fetch on its own.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Identifier used in diagnostics.
    fn key(&self) -> &str;
}

struct Inner<T> {
    key: String,
    fetch: FetchFn<T>,
    enabled: bool,
    started: AtomicU64,
    result: watch::Sender<QueryResult<T>>,
}

/// Marks one refetch as in flight until dropped, including when the
/// refetch future is dropped before it completes.
struct InFlight<'a, T> {
    result: &'a watch::Sender<QueryResult<T>>,
}

impl<'a, T> InFlight<'a, T> {
    fn enter(result: &'a watch::Sender<QueryResult<T>>) -> Self {
        result.send_modify(|result| {
            result.in_flight += 1;
            result.is_fetching = true;
        });
        Self { result }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.result.send_modify(|result| {
            result.in_flight = result.in_flight.saturating_sub(1);
            result.is_fetching = result.in_flight > 0;
        });
    }
}

/// A shared query cell around an async fetch function.
///
/// Clones share the fetch function and the published result.
///
/// # Examples
///
/// ```
/// use stowage::query::{Query, QueryStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let query = Query::new("answer", || async { Ok(42) });
/// assert_eq!(query.result().status, QueryStatus::Pending);
///
/// let result = query.refetch().await;
/// assert_eq!(result.data, Some(42));
/// # }
/// ```
pub struct Query<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Query<T> {
    pub fn new<F, Fut>(key: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self::build(key.into(), fetch, true)
    }

    /// A query that only fetches when [`refetch`](Self::refetch) is called
    /// explicitly; schedulers skip its initial fetch.
    pub fn lazy<F, Fut>(key: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self::build(key.into(), fetch, false)
    }

    fn build<F, Fut>(key: String, fetch: F, enabled: bool) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let fetch: FetchFn<T> = Arc::new(move || Box::pin(fetch()));
        let (result, _) = watch::channel(QueryResult::pending());
        Self {
            inner: Arc::new(Inner {
                key,
                fetch,
                enabled,
                started: AtomicU64::new(0),
                result,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Latest published result.
    pub fn result(&self) -> QueryResult<T> {
        self.inner.result.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.result.borrow().data.clone()
    }

    /// Receiver woken on every published result.
    pub fn subscribe(&self) -> watch::Receiver<QueryResult<T>> {
        self.inner.result.subscribe()
    }

    /// Run the fetch function and publish its outcome.
    ///
    /// Fetch errors are not returned as `Err`; they land in the result's
    /// `status`/`error` fields like any other outcome. An outcome that
    /// arrives after a later-started refetch already published is counted
    /// but otherwise discarded. Dropping the future mid-fetch publishes
    /// nothing except the end of the fetch.
    pub async fn refetch(&self) -> QueryResult<T> {
        let generation = self.inner.started.fetch_add(1, Ordering::AcqRel) + 1;
        let in_flight = InFlight::enter(&self.inner.result);
        let outcome = (self.inner.fetch)().await;

        self.inner.result.send_modify(|result| {
            result.fetch_count += 1;
            if generation < result.applied {
                tracing::debug!(key = %self.inner.key, generation, "discarding stale fetch");
                return;
            }
            result.applied = generation;
            match outcome {
                Ok(data) => {
                    result.data = Some(data);
                    result.status = QueryStatus::Success;
                    result.error = None;
                }
                Err(err) => {
                    tracing::debug!(key = %self.inner.key, error = %err, "query fetch failed");
                    result.status = QueryStatus::Error;
                    result.error = Some(err);
                }
            }
        });
        drop(in_flight);
        self.result()
    }

    /// Warm the result of a lazy query ahead of its first read.
    ///
    /// Does nothing while another fetch is already in flight.
    pub async fn prefetch(&self) {
        if self.inner.result.borrow().is_fetching {
            return;
        }
        self.refetch().await;
    }
}

impl<T: Clone + Send + Sync + 'static> Refetch for Query<T> {
    fn refetch(&self) -> BoxFuture<'static, ()> {
        let query = self.clone();
        Box::pin(async move {
            Query::refetch(&query).await;
        })
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    fn key(&self) -> &str {
        &self.inner.key
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.inner.key)
            .field("enabled", &self.inner.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn success_then_error_keeps_data() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let query = Query::new("flaky", move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(n)
                } else {
                    Err(FetchError::other("boom"))
                }
            }
        });

        let first = query.refetch().await;
        assert!(first.is_success());
        assert_eq!(first.data, Some(0));

        let second = query.refetch().await;
        assert!(second.is_error());
        assert_eq!(second.data, Some(0));
        assert_eq!(second.error.map(|e| e.to_string()), Some("boom".to_owned()));
        assert_eq!(second.fetch_count, 2);
    }

    #[tokio::test]
    async fn subscribers_see_results() {
        let query = Query::new("value", || async { Ok("hello") });
        let mut rx = query.subscribe();
        let clone = query.clone();
        tokio::spawn(async move {
            clone.refetch().await;
        });

        rx.wait_for(|result| result.fetch_count == 1).await.unwrap();
        assert_eq!(query.data(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_refetch_clears_fetching() {
        let query = Query::new("slow", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(1u8)
        });

        let cut_short = tokio::time::timeout(Duration::from_millis(100), query.refetch()).await;
        assert!(cut_short.is_err());

        let result = query.result();
        assert!(!result.is_fetching);
        assert!(result.is_pending());
        assert_eq!(result.fetch_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn later_refetch_wins_over_slower_earlier_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let query = Query::new("race", move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                let delay = if n == 0 { 300 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(n)
            }
        });

        let slow = tokio::spawn({
            let query = query.clone();
            async move { query.refetch().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fast = query.refetch().await;
        assert_eq!(fast.data, Some(1));
        assert!(fast.is_fetching);

        let slow = slow.await.unwrap();
        assert_eq!(slow.data, Some(1));
        assert!(!slow.is_fetching);
        assert_eq!(slow.fetch_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_fills_lazy_query_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let query = Query::lazy("user", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("ada")
            }
        });
        assert!(query.data().is_none());

        tokio::join!(query.prefetch(), query.prefetch());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(query.data(), Some("ada"));

        query.prefetch().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refetch_through_trait() {
        let query = Query::lazy("lazy", || async { Ok(1u8) });
        let refetch: &dyn Refetch = &query;
        assert!(!refetch.is_enabled());
        assert_eq!(refetch.key(), "lazy");
        assert!(query.result().is_pending());

        refetch.refetch().await;
        assert_eq!(query.data(), Some(1));
    }
}
