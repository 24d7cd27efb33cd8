use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::FetchError;

/// Source of JSON documents for queries and resources.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// Plain HTTP GET with JSON decoding. Non-2xx responses are errors.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and decode the body as `T`.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
        let fetcher = self.clone();
        let url = url.to_owned();
        Box::pin(async move { fetcher.get_json(&url).await })
    }
}

/// GET `url` with a default client and decode the JSON body.
#[cfg(feature = "http")]
pub async fn fetch_json<T: serde::de::DeserializeOwned>(url: &str) -> Result<T, FetchError> {
    HttpFetcher::new().get_json(url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Query, Resource};
    use serde_json::json;
    use std::sync::Arc;

    struct Canned(Value);

    impl Fetcher for Canned {
        fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
            let body = json!({ "url": url, "body": self.0.clone() });
            Box::pin(async move { Ok(body) })
        }
    }

    #[tokio::test]
    async fn fetchers_plug_into_queries() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(Canned(json!([1, 2])));
        let query = Query::new("users", move || fetcher.fetch("/api/users"));
        let result = query.refetch().await;
        assert_eq!(result.data, Some(json!({"url": "/api/users", "body": [1, 2]})));
    }

    #[tokio::test]
    async fn fetchers_plug_into_resources() {
        let fetcher = Canned(json!({"name": "ada"}));
        let resource = Resource::spawn(fetcher.fetch("/api/me"));
        assert_eq!(resource.get().await.unwrap()["body"]["name"], "ada");
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn unreachable_host_is_an_http_error() {
        let result: Result<Value, FetchError> = fetch_json("http://127.0.0.1:9/none").await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
