//! HTTP client construction.

pub mod fetcher;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientBuilder;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::errors::Result;

/// Builds the shared `reqwest` client used against the Jobcan API:
/// `Authorization: Token <token>` + `Content-Type: application/json`, with a
/// bounded exponential-backoff retry middleware for transient transport
/// errors (not to be confused with the per-item retryable-warning channel,
/// which is handled one layer up by the Fetcher).
pub struct Http {
    base_url: String,
    headers: HeaderMap,
}

impl Http {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            base_url: base_url.into(),
            headers,
        }
    }

    pub fn with_token(mut self, token: &str) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("Token {token}"))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn header(mut self, key: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(key.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds a plain `reqwest::Client` carrying the configured headers.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .default_headers(self.headers.clone())
            .build()?)
    }

    /// Builds a retry-middleware-wrapped client for idempotent GET traffic.
    pub fn build_retrying_client(&self) -> Result<reqwest_middleware::ClientWithMiddleware> {
        let inner = self.build_client()?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        Ok(ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build())
    }
}
