//! A [`NetworkFetcher`] backed by `reqwest`.
//!
//! Every attempt carries its own timeout and is made exactly once. Redirects
//! follow the client's policy; the fetcher never retries.

use std::time::Duration;

use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use mcp_audit::BoxFuture;
use mcp_audit::error::FetchError;
use mcp_audit::fetch::{FetchResponse, NetworkFetcher};
use reqwest::Client;

use crate::constants::ACCEPT_JSON;

/// Sends single `GET` / `HEAD` attempts for OAuth discovery and reachability.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    /// Shared Reqwest HTTP client
    client: Client,
    /// Extra headers sent with each request
    headers: HeaderMap,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher around a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
        }
    }

    /// Adds headers sent with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    async fn get_inner(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .header(ACCEPT, HeaderValue::from_static(ACCEPT_JSON))
            .timeout(timeout)
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(fetch_error)?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }

    async fn head_inner(&self, url: &str, timeout: Duration) -> Result<u16, FetchError> {
        let response = self
            .client
            .head(url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(fetch_error)?;
        Ok(response.status().as_u16())
    }
}

impl NetworkFetcher for HttpFetcher {
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
        Box::pin(async move {
            let result = self.get_inner(url, timeout).await;
            #[cfg(feature = "telemetry")]
            match &result {
                Ok(response) => tracing::debug!(url, status = response.status, "GET"),
                Err(err) => tracing::debug!(url, error = %err, "GET failed"),
            }
            result
        })
    }

    fn head<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u16, FetchError>> {
        Box::pin(async move {
            let result = self.head_inner(url, timeout).await;
            #[cfg(feature = "telemetry")]
            if let Err(err) = &result {
                tracing::debug!(url, error = %err, "HEAD failed");
            }
            result
        })
    }
}

/// Folds a `reqwest` error into the collaborator error the engines see.
fn fetch_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_builder() {
        FetchError::InvalidUrl(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_get_returns_status_content_type_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-protected-resource"))
            .and(header("accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"resource": "https://mcp.example.com"})),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new();
        let url = format!("{}/.well-known/oauth-protected-resource", mock_server.uri());
        let response = fetcher.get(&url, TIMEOUT).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_json());
        assert!(response.body.contains("mcp.example.com"));
    }

    #[tokio::test]
    async fn test_get_passes_non_success_through() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new();
        let response = fetcher
            .get(&format!("{}/missing", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.body, "not here");
    }

    #[tokio::test]
    async fn test_head_returns_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new();
        let status = fetcher
            .head(&format!("{}/mcp", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(status, 405);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new();
        let err = fetcher
            .get(&mock_server.uri(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.get("not a url", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("x-audit", "1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-audit", HeaderValue::from_static("1"));
        let fetcher = HttpFetcher::new().with_headers(headers);
        let response = fetcher.get(&mock_server.uri(), TIMEOUT).await.unwrap();
        assert_eq!(response.status, 204);
    }
}
