//! Final run summary.

use console::style;

use crate::scrapers::CrawlReport;
use crate::services::UpsertReport;

/// Whether the run produced nothing usable: no strategy extracted a single
/// record (a fatal fetch error before any results included).
pub fn should_fail(report: &CrawlReport) -> bool {
    !report.cancelled && report.found == 0
}

pub fn print_summary(
    crawl: Option<&CrawlReport>,
    upsert: Option<&UpsertReport>,
    expected: Option<usize>,
) {
    println!("\n{}", style("Summary").bold());
    println!("{}", "-".repeat(40));

    if let Some(report) = crawl {
        println!("{:<22} {}", "Pages fetched:", report.pages_fetched);
        println!("{:<22} {}", "Records found:", report.found);
        println!("{:<22} {}", "New records:", report.records.len());
        println!("{:<22} {}", "Duplicates skipped:", report.duplicates_skipped);
    }

    if let Some(report) = upsert {
        println!("{:<22} {}", "Records added:", report.added);
        println!("{:<22} {}", "Already in store:", report.skipped);
        if report.interrupted > 0 {
            println!(
                "{:<22} {}",
                "Not written (Ctrl-C):",
                style(report.interrupted).yellow()
            );
        }
        if report.failed > 0 {
            println!(
                "{:<22} {}",
                "Write failures:",
                style(report.failed).red()
            );
        }
    }

    let Some(report) = crawl else {
        return;
    };

    if report.found == 0 {
        let reason = report
            .fatal
            .as_ref()
            .map(|e| format!(": {}", e))
            .unwrap_or_default();
        println!(
            "\n{} No source data could be retrieved{}",
            style("✗").red(),
            reason
        );
    } else if let Some(expected) = expected {
        let marker = if report.found >= expected {
            style("✓").green()
        } else {
            style("!").yellow()
        };
        println!(
            "\n{} {} of {} expected records found",
            marker, report.found, expected
        );
    } else if let Some(ref e) = report.fatal {
        println!(
            "\n{} Crawl aborted early ({}); partial results kept",
            style("!").yellow(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::FetchError;

    #[test]
    fn test_fatal_without_results_fails() {
        let report = CrawlReport {
            fatal: Some(FetchError::fatal("https://x", "dns error")),
            ..Default::default()
        };
        assert!(should_fail(&report));
    }

    #[test]
    fn test_partial_results_succeed() {
        let report = CrawlReport {
            found: 12,
            fatal: Some(FetchError::fatal("https://x", "connection refused")),
            ..Default::default()
        };
        assert!(!should_fail(&report));
    }

    #[test]
    fn test_rerun_with_nothing_new_succeeds() {
        let report = CrawlReport {
            found: 80,
            duplicates_skipped: 80,
            ..Default::default()
        };
        assert!(!should_fail(&report));
    }
}
