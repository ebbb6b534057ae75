//! Per-host request pacing.
//!
//! Every request to the remote board waits at least the configured base
//! delay after the previous one to the same host. Throttling responses push
//! the delay up (or to the server's `Retry-After`, whichever is longer) and a
//! run of successes walks it back down, never below the base delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Pacing tunables.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Fixed courtesy delay between requests to one host.
    pub base_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Growth factor after a 429/503.
    pub backoff_multiplier: f64,
    /// Growth factor after any other 5xx.
    pub server_error_multiplier: f64,
    /// Shrink factor once `recovery_threshold` successes arrive in a row.
    pub recovery_multiplier: f64,
    pub recovery_threshold: u32,
}

impl RateLimitConfig {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Default::default()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            server_error_multiplier: 1.5,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

/// What a response says about the host's load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Ok,
    /// 429 or 503, with the server's `Retry-After` if it sent one.
    Throttled { retry_after: Option<Duration> },
    ServerError,
    /// Anything that says nothing about load (4xx other than 429).
    Neutral,
}

impl Feedback {
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 | 503 => Self::Throttled { retry_after },
            500..=599 => Self::ServerError,
            200..=399 => Self::Ok,
            _ => Self::Neutral,
        }
    }
}

/// Parse a `Retry-After` value given in seconds. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pacing state of one host.
#[derive(Debug, Clone)]
struct HostPacing {
    delay: Duration,
    last_request: Option<Instant>,
    streak: u32,
    backing_off: bool,
    requests: u64,
    throttled: u64,
}

impl HostPacing {
    fn new(base_delay: Duration) -> Self {
        Self {
            delay: base_delay,
            last_request: None,
            streak: 0,
            backing_off: false,
            requests: 0,
            throttled: 0,
        }
    }

    fn wait(&self) -> Duration {
        self.last_request
            .map(|last| self.delay.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Fold one response into the delay. Returns true when the host left
    /// backoff.
    fn apply(&mut self, feedback: Feedback, config: &RateLimitConfig) -> bool {
        match feedback {
            Feedback::Ok => {
                self.streak += 1;
                if !self.backing_off || self.streak < config.recovery_threshold {
                    return false;
                }
                self.streak = 0;
                let reduced = self.delay.mul_f64(config.recovery_multiplier);
                if reduced <= config.base_delay {
                    self.delay = config.base_delay;
                    self.backing_off = false;
                    return true;
                }
                self.delay = reduced;
            }
            Feedback::Throttled { retry_after } => {
                self.throttled += 1;
                let grown = self.delay.mul_f64(config.backoff_multiplier);
                self.back_off(grown.max(retry_after.unwrap_or_default()), config);
            }
            Feedback::ServerError => {
                let grown = self.delay.mul_f64(config.server_error_multiplier);
                self.back_off(grown, config);
            }
            Feedback::Neutral => {}
        }
        false
    }

    fn back_off(&mut self, delay: Duration, config: &RateLimitConfig) {
        self.streak = 0;
        self.backing_off = true;
        self.delay = delay.min(config.max_delay);
    }
}

/// Snapshot of one host's pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStats {
    pub delay: Duration,
    pub backing_off: bool,
    pub requests: u64,
    pub throttled: u64,
}

/// Shared, cloneable pacer keyed by host name.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hosts: Arc<RwLock<HashMap<String, HostPacing>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::default(),
        }
    }

    pub fn host_of(url: &str) -> Option<String> {
        Url::parse(url).ok()?.host_str().map(str::to_string)
    }

    /// Wait for the host's turn and mark a request as started. Returns the
    /// host key to report the response against.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let host = Self::host_of(url)?;

        let wait = self
            .hosts
            .read()
            .await
            .get(&host)
            .map(HostPacing::wait)
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            debug!("Pacing {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }

        let mut hosts = self.hosts.write().await;
        let pacing = hosts
            .entry(host.clone())
            .or_insert_with(|| HostPacing::new(self.config.base_delay));
        pacing.last_request = Some(Instant::now());
        pacing.requests += 1;

        Some(host)
    }

    pub async fn report(&self, host: &str, feedback: Feedback) {
        let mut hosts = self.hosts.write().await;
        let Some(pacing) = hosts.get_mut(host) else {
            return;
        };

        let recovered = pacing.apply(feedback, &self.config);
        match feedback {
            Feedback::Throttled { .. } => {
                warn!("{} is throttling, slowing to {:?}", host, pacing.delay)
            }
            Feedback::ServerError => debug!("{} server error, delay {:?}", host, pacing.delay),
            _ if recovered => info!("{} back to the base delay", host),
            _ => {}
        }
    }

    pub async fn stats(&self, host: &str) -> Option<HostStats> {
        self.hosts.read().await.get(host).map(|p| HostStats {
            delay: p.delay,
            backing_off: p.backing_off,
            requests: p.requests,
            throttled: p.throttled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64) -> RateLimitConfig {
        RateLimitConfig::with_base_delay(Duration::from_millis(base_ms))
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            RateLimiter::host_of("https://www.example.go.kr/board?page=2"),
            Some("www.example.go.kr".to_string())
        );
        assert_eq!(RateLimiter::host_of("not a url"), None);
    }

    #[test]
    fn test_feedback_from_status() {
        assert_eq!(Feedback::from_status(200, None), Feedback::Ok);
        assert_eq!(
            Feedback::from_status(429, Some(Duration::from_secs(3))),
            Feedback::Throttled {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(Feedback::from_status(502, None), Feedback::ServerError);
        assert_eq!(Feedback::from_status(404, None), Feedback::Neutral);
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_second_request_waits_base_delay() {
        let limiter = RateLimiter::new(config(50));

        let start = Instant::now();
        limiter.acquire("https://example.com/1").await;
        limiter.acquire("https://example.com/2").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_throttling_backs_off_to_retry_after() {
        let limiter = RateLimiter::new(config(100));
        limiter.acquire("https://example.com/1").await;

        limiter
            .report("example.com", Feedback::from_status(429, None))
            .await;
        let stats = limiter.stats("example.com").await.unwrap();
        assert_eq!(stats.delay, Duration::from_millis(200));
        assert!(stats.backing_off);
        assert_eq!(stats.throttled, 1);

        limiter
            .report(
                "example.com",
                Feedback::from_status(503, Some(Duration::from_secs(5))),
            )
            .await;
        let stats = limiter.stats("example.com").await.unwrap();
        assert_eq!(stats.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_recovery_never_drops_below_base_delay() {
        let config = RateLimitConfig {
            recovery_threshold: 1,
            recovery_multiplier: 0.1,
            ..config(10)
        };
        let mut pacing = HostPacing::new(config.base_delay);

        assert!(!pacing.apply(Feedback::ServerError, &config));
        assert!(pacing.apply(Feedback::Ok, &config));
        assert_eq!(pacing.delay, Duration::from_millis(10));
        assert!(!pacing.backing_off);
    }

    #[test]
    fn test_successes_outside_backoff_keep_base_delay() {
        let config = config(10);
        let mut pacing = HostPacing::new(config.base_delay);
        for _ in 0..20 {
            pacing.apply(Feedback::Ok, &config);
        }
        assert_eq!(pacing.delay, Duration::from_millis(10));
    }
}
