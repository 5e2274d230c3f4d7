//! Fallback Price Source
//!
//! HTTP adapter for the secondary price API. The upstream WebSocket feed is
//! authoritative; this source only seeds symbols the feed has not priced
//! yet, so every error here is degraded freshness rather than a fault.
//!
//! # Response shape
//!
//! ```json
//! { "bitcoin": { "usd": 63250.12 }, "ethereum": { "usd": 2610.4 } }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{FallbackError, FallbackSource};

/// Configuration for the HTTP fallback source.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Base URL of the price endpoint.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl FallbackConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

/// Per-asset price entry in the response body.
#[derive(Debug, Deserialize)]
struct AssetPrice {
    usd: Decimal,
}

/// HTTP implementation of [`FallbackSource`].
#[derive(Debug)]
pub struct HttpFallbackSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFallbackSource {
    /// Create a new fallback source.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError::Network`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &FallbackConfig) -> Result<Self, FallbackError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FallbackError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl FallbackSource for HttpFallbackSource {
    async fn fetch_prices(
        &self,
        asset_keys: &[String],
    ) -> Result<HashMap<String, Decimal>, FallbackError> {
        if asset_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = asset_keys.join(",");
        tracing::debug!(ids = %ids, "Fetching fallback prices");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|e| FallbackError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FallbackError::Api {
                status: response.status().as_u16(),
            });
        }

        let body: HashMap<String, AssetPrice> = response
            .json()
            .await
            .map_err(|e| FallbackError::Parse(e.to_string()))?;

        Ok(body
            .into_iter()
            .map(|(key, entry)| (key, entry.usd))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    async fn source_for(server: &MockServer) -> HttpFallbackSource {
        let config = FallbackConfig::new(server.uri(), Duration::from_secs(5));
        HttpFallbackSource::new(&config).expect("client builds")
    }

    #[tokio::test]
    async fn parses_prices_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bitcoin": {"usd": 63250.12},
                "ethereum": {"usd": 2610.4},
            })))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let prices = source
            .fetch_prices(&keys(&["bitcoin", "ethereum"]))
            .await
            .expect("request succeeds");

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["bitcoin"].to_string(), "63250.12");
        assert_eq!(prices["ethereum"].to_string(), "2610.4");
    }

    #[tokio::test]
    async fn missing_keys_are_absent_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bitcoin": {"usd": 63250.12},
            })))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let prices = source
            .fetch_prices(&keys(&["bitcoin", "no-such-asset"]))
            .await
            .expect("request succeeds");

        assert_eq!(prices.len(), 1);
        assert!(!prices.contains_key("no-such-asset"));
    }

    #[tokio::test]
    async fn empty_key_list_skips_the_request() {
        let server = MockServer::start().await;
        // No mock mounted: a request would 404 and fail the test.

        let source = source_for(&server).await;
        let prices = source.fetch_prices(&[]).await.expect("no request made");

        assert!(prices.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let error = source
            .fetch_prices(&keys(&["bitcoin"]))
            .await
            .expect_err("rate limit should surface");

        assert!(matches!(error, FallbackError::Api { status: 429 }));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let error = source
            .fetch_prices(&keys(&["bitcoin"]))
            .await
            .expect_err("parse failure should surface");

        assert!(matches!(error, FallbackError::Parse(_)));
    }
}
