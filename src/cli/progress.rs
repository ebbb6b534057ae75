//! Spinner-backed crawl progress.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::scrapers::{CrawlObserver, FetchError, RunSummary, StopReason, Strategy};

/// Shows the current strategy and page on a spinner and prints one line
/// per finished strategy above it.
pub struct CrawlProgress {
    bar: ProgressBar,
}

impl CrawlProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Whether lines bypass the spinner. A hidden bar (stderr not a
    /// terminal) drops everything passed to `ProgressBar::println`.
    fn prints_directly(&self) -> bool {
        self.bar.is_hidden()
    }

    /// Print above the spinner, or straight to stdout when there is none.
    fn println(&self, message: String) {
        if self.prints_directly() {
            println!("{}", message);
        } else {
            self.bar.println(message);
        }
    }
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_line(error: &FetchError, attempt: u32) -> String {
    format!(
        "  {} attempt {} failed: {}",
        style("!").yellow(),
        attempt,
        error
    )
}

fn finished_line(summary: &RunSummary) -> String {
    let marker = match summary.stop {
        StopReason::Fatal(_) => style("✗").red(),
        StopReason::Unsupported | StopReason::Cancelled => style("!").yellow(),
        _ if summary.found > 0 => style("✓").green(),
        _ => style("✗").red(),
    };
    format!(
        "{} {:<18} {:>5} found {:>5} new {:>4} pages  ({})",
        marker,
        summary.strategy,
        summary.found,
        summary.added,
        summary.pages_fetched,
        summary.stop.describe()
    )
}

impl CrawlObserver for CrawlProgress {
    fn strategy_started(&self, strategy: &Strategy) {
        self.bar
            .set_message(format!("Probing {}...", style(strategy).cyan()));
    }

    fn page_done(&self, strategy: &str, page: u32, extracted: usize, new: usize) {
        self.bar.set_message(format!(
            "{} page {}: {} records ({} new)",
            style(strategy).cyan(),
            page,
            extracted,
            new
        ));
    }

    fn retrying(&self, error: &FetchError, attempt: u32) {
        self.println(retry_line(error, attempt));
    }

    fn strategy_finished(&self, summary: &RunSummary) {
        self.println(finished_line(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(stop: StopReason) -> RunSummary {
        RunSummary {
            strategy: "form-post:cPage".to_string(),
            found: 80,
            added: 12,
            pages_fetched: 13,
            duplicates: 68,
            stop,
        }
    }

    #[test]
    fn test_hidden_bar_prints_to_stdout() {
        let progress = CrawlProgress {
            bar: ProgressBar::hidden(),
        };
        assert!(progress.prints_directly());
        progress.strategy_finished(&summary(StopReason::EmptyStreak));
    }

    #[test]
    fn test_finished_line_reports_counts_and_stop() {
        let line = console::strip_ansi_codes(&finished_line(&summary(StopReason::EmptyStreak)))
            .into_owned();
        assert!(line.starts_with("✓ form-post:cPage"));
        assert!(line.contains("80 found"));
        assert!(line.contains("12 new"));
        assert!(line.contains("13 pages"));
        assert!(line.contains("too many empty pages"));
    }

    #[test]
    fn test_retry_line_names_attempt_and_error() {
        let error = FetchError::transient("https://example.com/?page=2", "HTTP 502");
        let line = console::strip_ansi_codes(&retry_line(&error, 2)).into_owned();
        assert!(line.contains("attempt 2 failed"));
        assert!(line.contains("HTTP 502"));
    }
}
