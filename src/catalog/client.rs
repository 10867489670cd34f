// Marketplace API client
// Author: kelexine (https://github.com/kelexine)

use crate::config::UpstreamConfig;
use crate::error::{CacheError, Result};
use crate::utils::retry::{parse_retry_after, with_retry, AttemptError};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Client for the marketplace API that owns store and product data.
///
/// Responses are passed through as JSON documents; the cache only needs them
/// to be serializable.
pub struct MarketplaceClient {
    http_client: Client,
    base_url: Url,
}

impl MarketplaceClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CacheError::Config(format!("invalid upstream.base_url {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "upstream.base_url {} cannot carry a path",
                config.base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| CacheError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// `GET {base}/stores/{tenant}`
    pub async fn store(&self, tenant: &str) -> Result<Value> {
        let url = self.endpoint(&["stores", tenant]);
        self.get_json("store", url).await
    }

    /// `GET {base}/stores/{tenant}/products?page={page}`
    pub async fn products(&self, tenant: &str, page: u32) -> Result<Value> {
        let mut url = self.endpoint(&["stores", tenant, "products"]);
        url.query_pairs_mut().append_pair("page", &page.to_string());
        self.get_json("products", url).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in new(): the base can carry a path
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, endpoint: &'static str, url: Url) -> Result<Value> {
        let started = Instant::now();
        debug!("Fetching {} from {}", endpoint, url);

        let request_logic = || async {
            let response = self
                .http_client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| AttemptError::transport(format!("network error: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body = response.text().await.unwrap_or_default();
                return Err(AttemptError {
                    status: status.as_u16(),
                    body,
                    retry_after,
                });
            }

            response.json::<Value>().await.map_err(|e| {
                AttemptError::new(status.as_u16(), format!("invalid JSON body: {}", e))
            })
        };

        let result = with_retry(endpoint, request_logic).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(value) => {
                crate::metrics::record_upstream_call(endpoint, 200, elapsed);
                Ok(value)
            }
            Err(err) => {
                crate::metrics::record_upstream_call(endpoint, err.status, elapsed);
                Err(match err.status {
                    404 => CacheError::NotFound(format!("{} at {}", endpoint, url.path())),
                    0 => CacheError::Upstream(err.body),
                    status => CacheError::Upstream(format!("HTTP {}: {}", status, err.body)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> MarketplaceClient {
        MarketplaceClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_building() {
        let c = client("http://api.local/api");
        assert_eq!(
            c.endpoint(&["stores", "pizza-place"]).as_str(),
            "http://api.local/api/stores/pizza-place"
        );

        // trailing slash on the base does not produce an empty segment
        let c = client("http://api.local/api/");
        assert_eq!(
            c.endpoint(&["stores", "a b"]).as_str(),
            "http://api.local/api/stores/a%20b"
        );
    }

    #[test]
    fn test_rejects_invalid_base() {
        let result = MarketplaceClient::new(&UpstreamConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetches_store() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stores/pizza-place")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"17","slug":"pizza-place","open":true}"#)
            .create_async()
            .await;

        let c = client(&format!("{}/api", server.url()));
        let store = c.store("pizza-place").await.unwrap();

        assert_eq!(store["id"], "17");
        assert_eq!(store["open"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetches_product_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stores/17/products")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"page":2,"items":[{"name":"Margherita","price":32.5}]}"#)
            .create_async()
            .await;

        let c = client(&format!("{}/api", server.url()));
        let page = c.products("17", 2).await.unwrap();

        assert_eq!(page["items"][0]["name"], "Margherita");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_maps_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stores/ghost")
            .with_status(404)
            .with_body("no such store")
            .expect(1)
            .create_async()
            .await;

        let c = client(&format!("{}/api", server.url()));
        let err = c.store("ghost").await.unwrap_err();

        assert!(matches!(err, CacheError::NotFound(_)));
        // 404 is not retried
        mock.assert_async().await;
    }
}
