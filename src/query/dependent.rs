use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::query::{Query, QueryResult};
use crate::equality::DeepEq;
use crate::error::FetchError;

/// A query refetched whenever the value it depends on changes.
///
/// The fetch function receives the current dependencies. Setting a value
/// that is structurally equal to the current one does not fetch.
pub struct Dependent<T, D> {
    query: Query<T>,
    dependencies: Arc<Mutex<D>>,
}

impl<T, D> Dependent<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: Serialize + Clone + Send + 'static,
{
    pub fn new<F, Fut>(key: impl Into<String>, dependencies: D, fetch: F) -> Self
    where
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let dependencies = Arc::new(Mutex::new(dependencies));
        let current = Arc::clone(&dependencies);
        let query = Query::new(key, move || fetch(current.lock().clone()));
        Self {
            query,
            dependencies,
        }
    }

    pub fn dependencies(&self) -> D {
        self.dependencies.lock().clone()
    }

    /// Replace the dependencies and refetch if they changed.
    ///
    /// `None` when the new value equals the current one.
    pub async fn set_dependencies(&self, dependencies: D) -> Option<QueryResult<T>> {
        {
            let mut current = self.dependencies.lock();
            if (*current).deep_eq(&dependencies) {
                return None;
            }
            *current = dependencies;
        }
        tracing::trace!(key = self.query.key(), "dependencies changed");
        Some(self.query.refetch().await)
    }

    pub async fn refetch(&self) -> QueryResult<T> {
        self.query.refetch().await
    }

    pub fn result(&self) -> QueryResult<T> {
        self.query.result()
    }

    /// The underlying query, e.g. to hand to a scheduler for the initial
    /// fetch.
    pub fn query(&self) -> &Query<T> {
        &self.query
    }
}

impl<T, D> Clone for Dependent<T, D> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            dependencies: Arc::clone(&self.dependencies),
        }
    }
}

impl<T, D: fmt::Debug> fmt::Debug for Dependent<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependent")
            .field("query", &self.query)
            .field("dependencies", &*self.dependencies.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::schedule::{ScheduleOptions, Scheduler};

    #[derive(Debug, Clone, Serialize)]
    struct Filter {
        user: u32,
        tags: HashMap<String, bool>,
    }

    fn filter(user: u32, tags: &[&str]) -> Filter {
        Filter {
            user,
            tags: tags.iter().map(|tag| (tag.to_string(), true)).collect(),
        }
    }

    #[tokio::test]
    async fn refetches_only_on_structural_change() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let posts = Dependent::new("posts", filter(1, &["a", "b"]), move |filter: Filter| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move { Ok(filter.user * 10) }
        });

        assert!(posts.set_dependencies(filter(1, &["b", "a"])).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = posts.set_dependencies(filter(2, &["a", "b"])).await.unwrap();
        assert_eq!(result.data, Some(20));
        assert_eq!(posts.dependencies().user, 2);

        assert!(posts.set_dependencies(filter(2, &["a", "b"])).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_initial_fetch_with_current_dependencies() {
        let posts = Dependent::new("posts", 7u32, |user| async move { Ok(user) });
        let _handle = Scheduler::new().spawn(
            posts.query().clone(),
            ScheduleOptions::default().with_delay(Duration::from_millis(10)),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(posts.result().data, Some(7));

        posts.set_dependencies(8).await;
        assert_eq!(posts.result().data, Some(8));
        assert_eq!(posts.result().fetch_count, 2);
    }
}
