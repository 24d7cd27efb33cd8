use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use super::query::{Query, QueryResult};
use crate::error::FetchError;

/// Starting position of a [`Paginated`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageOptions {
    pub initial_page: u32,
    pub initial_limit: u32,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            initial_page: 1,
            initial_limit: 10,
        }
    }
}

/// A query whose fetch function receives the current page and page size.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    query: Query<T>,
    page: Arc<AtomicU32>,
    limit: Arc<AtomicU32>,
}

impl<T: Clone + Send + Sync + 'static> Paginated<T> {
    pub fn new<F, Fut>(key: impl Into<String>, options: PageOptions, fetch: F) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let page = Arc::new(AtomicU32::new(options.initial_page));
        let limit = Arc::new(AtomicU32::new(options.initial_limit));
        let (page_ref, limit_ref) = (Arc::clone(&page), Arc::clone(&limit));
        let query = Query::new(key, move || {
            fetch(
                page_ref.load(Ordering::Acquire),
                limit_ref.load(Ordering::Acquire),
            )
        });
        Self { query, page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u32 {
        self.limit.load(Ordering::Acquire)
    }

    /// Move to `page` and fetch it.
    ///
    /// When page changes overlap, the data always belongs to the page set
    /// last, whichever fetch finishes first.
    pub async fn set_page(&self, page: u32) -> QueryResult<T> {
        self.page.store(page, Ordering::Release);
        self.query.refetch().await
    }

    /// Change the page size and refetch the current page.
    pub async fn set_limit(&self, limit: u32) -> QueryResult<T> {
        self.limit.store(limit, Ordering::Release);
        self.query.refetch().await
    }

    /// The underlying query, e.g. to hand to a scheduler.
    pub fn query(&self) -> &Query<T> {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fetches_current_window() {
        let items: Vec<u32> = (1..=25).collect();
        let pages = Paginated::new("items", PageOptions::default(), move |page, limit| {
            let start = ((page - 1) * limit) as usize;
            let window: Vec<u32> = items.iter().copied().skip(start).take(limit as usize).collect();
            async move { Ok(window) }
        });
        assert_eq!((pages.page(), pages.limit()), (1, 10));

        let first = pages.query().refetch().await;
        assert_eq!(first.data.unwrap().len(), 10);

        let third = pages.set_page(3).await;
        assert_eq!(third.data, Some((21..=25).collect()));

        let resized = pages.set_limit(20).await;
        assert_eq!(resized.data, Some(Vec::new()));
        assert_eq!(pages.page(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_earlier_page_does_not_overwrite_later_one() {
        let pages = Paginated::new("items", PageOptions::default(), |page, _limit| async move {
            let delay = if page == 1 { 300 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(page)
        });

        let first = tokio::spawn({
            let pages = pages.clone();
            async move { pages.set_page(1).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = pages.set_page(2).await;
        assert_eq!(second.data, Some(2));
        assert!(second.is_fetching);

        let settled = first.await.unwrap();
        assert_eq!(settled.data, Some(2));
        assert!(!settled.is_fetching);
        assert_eq!(settled.fetch_count, 2);
        assert_eq!(pages.page(), 2);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: PageOptions = serde_json::from_str(r#"{"initial_limit": 20}"#).unwrap();
        assert_eq!(
            options,
            PageOptions {
                initial_page: 1,
                initial_limit: 20
            }
        );
    }
}
