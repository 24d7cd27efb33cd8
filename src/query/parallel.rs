use futures_util::future::join_all;

use super::query::Query;
use crate::error::FetchError;

/// A fixed group of queries observed and refetched together.
#[derive(Debug, Clone)]
pub struct ParallelQueries<T> {
    queries: Vec<Query<T>>,
}

impl<T: Clone + Send + Sync + 'static> ParallelQueries<T> {
    pub fn new(queries: impl IntoIterator<Item = Query<T>>) -> Self {
        Self {
            queries: queries.into_iter().collect(),
        }
    }

    pub fn queries(&self) -> &[Query<T>] {
        &self.queries
    }

    /// Any query still waiting on its first result.
    pub fn is_loading(&self) -> bool {
        self.queries.iter().any(|q| q.result().is_pending())
    }

    pub fn is_error(&self) -> bool {
        self.queries.iter().any(|q| q.result().is_error())
    }

    pub fn is_success(&self) -> bool {
        self.queries.iter().all(|q| q.result().is_success())
    }

    pub fn data(&self) -> Vec<Option<T>> {
        self.queries.iter().map(Query::data).collect()
    }

    pub fn errors(&self) -> Vec<Option<FetchError>> {
        self.queries.iter().map(|q| q.result().error).collect()
    }

    /// Refetch every query concurrently and wait for all of them.
    pub async fn refetch_all(&self) {
        join_all(self.queries.iter().map(|q| q.refetch())).await;
    }
}
