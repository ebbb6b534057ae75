//! HTTP page fetcher with per-host pacing.

mod user_agent;

pub use user_agent::{resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::fetcher::{classify_status, classify_transport_error, FetchError, PageFetcher};
use super::rate_limiter::{parse_retry_after, Feedback, RateLimitConfig, RateLimiter};
use super::strategy::PageRequest;
use crate::models::RawPage;

/// Fetches pages over HTTP. Does not execute script.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Create a new HTTP client that waits `request_delay` between requests.
    /// - None: Use default crate user agent
    /// - Some("impersonate"): Use random real browser user agent
    /// - Some(custom): Use custom user agent string
    pub fn new(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let limiter = RateLimiter::new(RateLimitConfig::with_base_delay(request_delay));
        Self::with_rate_limiter(timeout, limiter, user_agent_config)
    }

    /// Create a client that paces through an existing (possibly shared) limiter.
    pub fn with_rate_limiter(
        timeout: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::fatal("", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, request: &PageRequest) -> Result<RawPage, FetchError> {
        let url = request.url.as_str();
        let host = self.rate_limiter.acquire(url).await;

        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        debug!("{} {} ({})", request.method, url, request.strategy);
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;
        let status = response.status().as_u16();

        if let Some(ref host) = host {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            self.rate_limiter
                .report(host, Feedback::from_status(status, retry_after))
                .await;
        }

        classify_status(url, status)?;

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        Ok(RawPage::new(
            request.page,
            request.strategy.clone(),
            body,
            status,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::strategy::Strategy;
    use url::Url;

    #[tokio::test]
    async fn test_client_builds_with_custom_agent() {
        let client = HttpClient::new(
            Duration::from_secs(5),
            Duration::from_millis(10),
            Some("TestBot/1.0"),
        );
        assert!(client.is_ok());
        assert!(!client.unwrap().executes_script());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fatal() {
        let client =
            HttpClient::new(Duration::from_secs(5), Duration::from_millis(1), None).unwrap();
        let base = Url::parse("http://127.0.0.1:1/board").unwrap();
        let request = Strategy::QueryParam {
            name: "page".to_string(),
        }
        .request(&base, 1);

        let err = client.fetch(&request).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
