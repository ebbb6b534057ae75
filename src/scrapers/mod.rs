//! Crawling the legacy guestbook: pagination strategies, fetching,
//! extraction, deduplication and the strategy-driven crawl loop.

pub mod accumulator;
pub mod dedup;
pub mod extract;
pub mod fetcher;
mod http_client;
pub mod rate_limiter;
pub mod strategy;

pub use accumulator::{
    CancelFlag, CrawlObserver, CrawlReport, CrawlSettings, NoopObserver, RunAccumulator,
    RunSummary, StopReason, StrategyRun,
};
pub use dedup::{Deduplicator, Fingerprint};
pub use extract::RecordExtractor;
pub use fetcher::{FetchError, PageFetcher};
pub use http_client::{resolve_user_agent, HttpClient, USER_AGENT};
pub use rate_limiter::{Feedback, RateLimitConfig, RateLimiter};
pub use strategy::{PageRequest, PaginationCheck, PaginationDetector, Strategy};
