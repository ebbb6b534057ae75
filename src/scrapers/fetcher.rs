//! The remote-source seam: one request in, one raw page or a classified
//! failure out.

use async_trait::async_trait;
use thiserror::Error;

use super::strategy::PageRequest;
use crate::models::RawPage;

/// A failed fetch, classified by how far the failure reaches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout or server error. The same request may be retried.
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },
    /// The current strategy cannot work (404, repeated transient failures).
    #[error("{url} unusable for this strategy: {reason}")]
    PermanentForStrategy { url: String, reason: String },
    /// The source cannot be reached at all (DNS, connection refused).
    #[error("fatal failure reaching {url}: {reason}")]
    Fatal { url: String, reason: String },
}

impl FetchError {
    pub fn transient(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermanentForStrategy {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. }
            | Self::PermanentForStrategy { url, .. }
            | Self::Fatal { url, .. } => url,
        }
    }
}

/// Map an HTTP status to a fetch outcome. `Ok(())` means the body is usable.
pub fn classify_status(url: &str, status: u16) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(FetchError::permanent(url, format!("HTTP {}", status))),
        408 | 429 | 500..=599 => Err(FetchError::transient(url, format!("HTTP {}", status))),
        _ => Err(FetchError::permanent(url, format!("HTTP {}", status))),
    }
}

/// Classify a transport-level failure from reqwest.
pub fn classify_transport_error(url: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::transient(url, format!("timed out: {}", err))
    } else if err.is_connect() || err.is_builder() {
        FetchError::fatal(url, err.to_string())
    } else {
        FetchError::transient(url, err.to_string())
    }
}

/// Source of raw pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issue exactly one request for one logical page.
    async fn fetch(&self, request: &PageRequest) -> Result<RawPage, FetchError>;

    /// Whether fetched pages have had their scripts executed. Hash-fragment
    /// paging only works against a fetcher that does.
    fn executes_script(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/board";

    #[test]
    fn test_success_statuses_pass() {
        assert!(classify_status(URL, 200).is_ok());
        assert!(classify_status(URL, 204).is_ok());
    }

    #[test]
    fn test_not_found_is_permanent_for_strategy() {
        for status in [404, 410] {
            let err = classify_status(URL, status).unwrap_err();
            assert!(matches!(err, FetchError::PermanentForStrategy { .. }));
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [408, 429, 500, 502, 503, 504] {
            let err = classify_status(URL, status).unwrap_err();
            assert!(err.is_transient(), "status {} should be transient", status);
        }
    }

    #[test]
    fn test_other_client_errors_are_permanent() {
        let err = classify_status(URL, 403).unwrap_err();
        assert!(matches!(err, FetchError::PermanentForStrategy { .. }));
        assert_eq!(err.url(), URL);
    }

    #[tokio::test]
    async fn test_connection_refused_is_fatal() {
        let client = reqwest::Client::new();
        let err = client
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        assert!(classify_transport_error("http://127.0.0.1:1/", &err).is_fatal());
    }
}
