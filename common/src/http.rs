// Shared HTTP client for source polling and Drone API calls

use crate::errors::FetchError;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

/// Thin wrapper around a reqwest client with a fixed timeout
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new HttpFetcher with the specified timeout
    pub fn new(timeout_seconds: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("drone-trigger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Attach the Drone key verbatim as the Authorization header
    fn apply_auth(request: RequestBuilder, auth_key: Option<&str>) -> RequestBuilder {
        match auth_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, key),
            None => request,
        }
    }

    /// GET `url` and return the body; non-2xx responses are errors
    #[instrument(skip(self, auth_key))]
    pub async fn get_text(&self, url: &str, auth_key: Option<&str>) -> Result<String, FetchError> {
        let request = Self::apply_auth(self.client.get(url), auth_key);

        let response = request.send().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        debug!(status = %status, "HTTP response received");

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    /// POST with an empty body and return the response status
    #[instrument(skip(self, auth_key))]
    pub async fn post_empty(
        &self,
        url: &str,
        auth_key: Option<&str>,
    ) -> Result<StatusCode, FetchError> {
        let request = Self::apply_auth(self.client.post(url), auth_key);

        let response = request.send().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_fetcher_creation() {
        assert!(HttpFetcher::new(30).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let fetcher = HttpFetcher::new(1).unwrap();
        let err = fetcher
            .get_text("http://127.0.0.1:1/nothing", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
