//! Strategy-driven crawl loop.
//!
//! A [`RunAccumulator`] walks one pagination strategy over a page range,
//! feeding every fetched page through the extractor and the shared
//! deduplicator. [`RunAccumulator::crawl`] tries strategies in priority order
//! until one clearly works.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::dedup::{Deduplicator, Fingerprint};
use super::extract::RecordExtractor;
use super::fetcher::{FetchError, PageFetcher};
use super::strategy::{PageRequest, PaginationCheck, PaginationDetector, Strategy};
use crate::models::{CandidateRecord, RawPage};

/// Tunables for the crawl loop.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub first_page: u32,
    /// Last page number tried by any strategy.
    pub max_pages: u32,
    pub max_consecutive_empty: u32,
    /// Empty streaks only end a strategy after this page.
    pub empty_grace_pages: u32,
    /// A strategy finding more distinct records than this ends the probing.
    pub success_threshold: usize,
    /// Retries of one request after a transient failure.
    pub max_retries: u32,
    /// Wait before retry n is n times this.
    pub retry_delay: Duration,
}

impl CrawlSettings {
    pub fn pages(&self) -> RangeInclusive<u32> {
        self.first_page..=self.max_pages
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            first_page: 1,
            max_pages: 300,
            max_consecutive_empty: 5,
            empty_grace_pages: 10,
            success_threshold: 50,
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Why a strategy's page loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the last page of the range.
    Exhausted,
    /// Too many empty pages in a row past the grace window.
    EmptyStreak,
    /// The server ignored the paging request.
    PaginationFailed(PaginationCheck),
    /// Failure that rules out this strategy only.
    Permanent(FetchError),
    /// Failure that rules out the whole run.
    Fatal(FetchError),
    /// The strategy needs a fetcher that executes script.
    Unsupported,
    Cancelled,
}

impl StopReason {
    pub fn describe(&self) -> String {
        match self {
            Self::Exhausted => "reached last page".to_string(),
            Self::EmptyStreak => "too many empty pages".to_string(),
            Self::PaginationFailed(PaginationCheck::Mismatch {
                requested,
                reported,
            }) => format!(
                "pagination ignored (asked for page {}, got page {})",
                requested, reported
            ),
            Self::PaginationFailed(_) => "pagination ignored (same content served twice)".to_string(),
            Self::Permanent(e) => e.to_string(),
            Self::Fatal(e) => e.to_string(),
            Self::Unsupported => "needs a script-executing fetcher".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Result of one strategy's page loop.
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub strategy: String,
    /// Records not seen before this run (by any strategy or in the store).
    pub records: Vec<CandidateRecord>,
    /// Distinct records this strategy extracted, new or not.
    pub found: usize,
    pub pages_fetched: u32,
    pub duplicates: usize,
    pub stop: StopReason,
}

impl StrategyRun {
    fn new(strategy: String) -> Self {
        Self {
            strategy,
            records: Vec::new(),
            found: 0,
            pages_fetched: 0,
            duplicates: 0,
            stop: StopReason::Exhausted,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            strategy: self.strategy.clone(),
            found: self.found,
            added: self.records.len(),
            pages_fetched: self.pages_fetched,
            duplicates: self.duplicates,
            stop: self.stop.clone(),
        }
    }
}

/// A [`StrategyRun`] without its records.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub strategy: String,
    pub found: usize,
    pub added: usize,
    pub pages_fetched: u32,
    pub duplicates: usize,
    pub stop: StopReason,
}

/// Merged outcome of all strategies tried.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub records: Vec<CandidateRecord>,
    /// Distinct records extracted by any strategy, including known ones.
    pub found: usize,
    pub runs: Vec<RunSummary>,
    pub pages_fetched: u32,
    pub duplicates_skipped: usize,
    pub fatal: Option<FetchError>,
    pub cancelled: bool,
}

impl CrawlReport {
    /// Strategy that crossed the success threshold, if any.
    pub fn winning_strategy(&self, threshold: usize) -> Option<&str> {
        self.runs
            .iter()
            .find(|r| r.found > threshold)
            .map(|r| r.strategy.as_str())
    }
}

/// Shared cancellation switch, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait CrawlObserver: Send + Sync {
    fn strategy_started(&self, _strategy: &Strategy) {}
    fn page_done(&self, _strategy: &str, _page: u32, _extracted: usize, _new: usize) {}
    fn retrying(&self, _error: &FetchError, _attempt: u32) {}
    fn strategy_finished(&self, _summary: &RunSummary) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {}

/// What one page contributed, computed without holding the DOM across awaits.
struct PageAnalysis {
    records: Vec<CandidateRecord>,
    first: Option<Fingerprint>,
    check: PaginationCheck,
}

/// A fetch that either produced a page or was cut short by cancellation.
enum Fetched {
    Page(RawPage),
    Cancelled { attempts: u32 },
}

/// Drives fetch, extract and dedup across pages and strategies.
pub struct RunAccumulator {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
    extractor: RecordExtractor,
    detector: PaginationDetector,
    dedup: Deduplicator,
    settings: CrawlSettings,
    cancel: CancelFlag,
    observer: Arc<dyn CrawlObserver>,
    extracted: HashSet<Fingerprint>,
}

impl RunAccumulator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: Url, settings: CrawlSettings) -> Self {
        Self {
            fetcher,
            base_url,
            extractor: RecordExtractor::default(),
            detector: PaginationDetector::default(),
            dedup: Deduplicator::default(),
            settings,
            cancel: CancelFlag::new(),
            observer: Arc::new(NoopObserver),
            extracted: HashSet::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: RecordExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_detector(mut self, detector: PaginationDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Start from an already seeded deduplicator (e.g. the store's contents).
    pub fn with_deduplicator(mut self, dedup: Deduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Try strategies in order until one finds more than the success
    /// threshold, a fatal error occurs, or the run is cancelled.
    pub async fn crawl(&mut self, strategies: &[Strategy]) -> CrawlReport {
        let mut report = CrawlReport::default();
        let pages = self.settings.pages();

        for strategy in strategies {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            self.observer.strategy_started(strategy);
            let run = self.run(strategy, pages.clone()).await;
            let summary = run.summary();
            self.observer.strategy_finished(&summary);

            info!(
                "Strategy {}: {} found, {} new, {} pages, stopped: {}",
                run.strategy,
                run.found,
                run.records.len(),
                run.pages_fetched,
                run.stop.describe()
            );

            report.pages_fetched += run.pages_fetched;
            report.duplicates_skipped += run.duplicates;
            report.records.extend(run.records);
            report.runs.push(summary);

            match run.stop {
                StopReason::Fatal(e) => {
                    warn!("Aborting crawl: {}", e);
                    report.fatal = Some(e);
                    break;
                }
                StopReason::Cancelled => {
                    report.cancelled = true;
                    break;
                }
                _ => {}
            }

            if run.found > self.settings.success_threshold {
                info!(
                    "Strategy {} found {} records, skipping remaining strategies",
                    run.strategy, run.found
                );
                break;
            }
        }

        report.found = self.extracted.len();
        report
    }

    /// Walk one strategy over `pages`.
    pub async fn run(&mut self, strategy: &Strategy, pages: RangeInclusive<u32>) -> StrategyRun {
        let mut run = StrategyRun::new(strategy.id());

        if strategy.requires_script() && !self.fetcher.executes_script() {
            debug!("Skipping {}: fetcher does not execute script", run.strategy);
            run.stop = StopReason::Unsupported;
            return run;
        }

        let mut distinct: HashSet<Fingerprint> = HashSet::new();
        let mut previous_first: Option<Fingerprint> = None;
        let mut consecutive_empty = 0u32;

        for page in pages {
            if self.cancel.is_cancelled() {
                run.stop = StopReason::Cancelled;
                return run;
            }

            let request = strategy.request(&self.base_url, page);
            let raw = match self.fetch_with_retry(&request).await {
                Ok(Fetched::Page(raw)) => raw,
                Ok(Fetched::Cancelled { attempts }) => {
                    info!(
                        "Cancelled {} at page {} after {} attempt(s)",
                        run.strategy, page, attempts
                    );
                    run.stop = StopReason::Cancelled;
                    return run;
                }
                Err(e) if e.is_fatal() => {
                    run.stop = StopReason::Fatal(e);
                    return run;
                }
                Err(e) => {
                    warn!("Abandoning {} at page {}: {}", run.strategy, page, e);
                    run.stop = StopReason::Permanent(e);
                    return run;
                }
            };
            run.pages_fetched += 1;

            let analysis = self.analyse(&raw, previous_first.as_ref());
            if analysis.records.is_empty() {
                consecutive_empty += 1;
                debug!(
                    "{} page {} empty ({} in a row)",
                    run.strategy, page, consecutive_empty
                );
                self.observer.page_done(&run.strategy, page, 0, 0);
                if consecutive_empty >= self.settings.max_consecutive_empty
                    && page > self.settings.empty_grace_pages
                {
                    run.stop = StopReason::EmptyStreak;
                    return run;
                }
                continue;
            }

            // Empty pages only feed the streak; they never judge pagination.
            if analysis.check.is_failure() {
                warn!(
                    "Abandoning {} at page {}: {:?}",
                    run.strategy, page, analysis.check
                );
                run.stop = StopReason::PaginationFailed(analysis.check);
                return run;
            }

            consecutive_empty = 0;
            previous_first = analysis.first;

            let extracted = analysis.records.len();
            let before = run.records.len();
            for record in analysis.records {
                let fingerprint = self.dedup.fingerprint(&record);
                if distinct.insert(fingerprint.clone()) {
                    run.found += 1;
                    self.extracted.insert(fingerprint.clone());
                }
                if self.dedup.seen(&fingerprint) {
                    run.duplicates += 1;
                } else {
                    self.dedup.mark_seen(fingerprint);
                    run.records.push(record);
                }
            }
            self.observer
                .page_done(&run.strategy, page, extracted, run.records.len() - before);
        }

        run
    }

    fn analyse(&self, raw: &RawPage, previous: Option<&Fingerprint>) -> PageAnalysis {
        let document = Html::parse_document(&raw.body);
        let records = self.extractor.extract_document(
            &document,
            raw.page,
            &raw.strategy,
            raw.fetched_at.date_naive(),
        );
        let first = records.first().map(|r| self.dedup.fingerprint(r));
        let check = self
            .detector
            .check(&document, raw.page, first.as_ref(), previous);

        PageAnalysis {
            records,
            first,
            check,
        }
    }

    /// Fetch with bounded retries. Transient failures that outlast the
    /// retries become permanent for the strategy; cancellation between
    /// attempts stops retrying.
    async fn fetch_with_retry(&self, request: &PageRequest) -> Result<Fetched, FetchError> {
        let attempts = self.settings.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.fetcher.fetch(request).await {
                Ok(page) => return Ok(Fetched::Page(page)),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            warn!("Attempt {}/{} failed: {}", attempt, attempts, error);
            self.observer.retrying(&error, attempt);

            if attempt >= attempts {
                return Err(FetchError::permanent(
                    request.url.as_str(),
                    format!(
                        "gave up after {} transient failures: {}",
                        attempts, error
                    ),
                ));
            }
            if self.cancel.is_cancelled() {
                return Ok(Fetched::Cancelled { attempts: attempt });
            }
            tokio::time::sleep(self.settings.retry_delay * attempt).await;
        }
    }
}
