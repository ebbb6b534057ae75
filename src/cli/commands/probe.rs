//! Check which pagination strategies the source honours.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::scrapers::{RunAccumulator, StopReason};

/// Fetch the first two pages with every strategy. Nothing is written.
pub async fn cmd_probe(settings: &Settings) -> anyhow::Result<()> {
    let url = settings.source_url()?;
    let strategies = settings.strategies()?;
    let client = Arc::new(settings.http_client()?);

    let first = settings.first_page;
    let last = first.saturating_add(1).min(settings.max_pages.max(first));

    println!(
        "{} Probing {} (pages {}-{})",
        style("→").cyan(),
        style(&url).bold(),
        first,
        last
    );
    println!("{}", "-".repeat(70));

    let mut confirmed = 0;
    for strategy in &strategies {
        // Fresh deduplicator per strategy so every probe sees all records.
        let mut accumulator = RunAccumulator::new(client.clone(), url.clone(), settings.crawl_settings())
            .with_extractor(settings.extractor())
            .with_detector(settings.detector());
        let run = accumulator.run(strategy, first..=last).await;

        let works = run.stop == StopReason::Exhausted && run.found > 0;
        if works {
            confirmed += 1;
        }
        let marker = if works {
            style("✓").green()
        } else if run.stop == StopReason::Unsupported {
            style("!").yellow()
        } else {
            style("✗").red()
        };
        println!(
            "{} {:<18} {:>4} records on {} pages  ({})",
            marker,
            run.strategy,
            run.found,
            run.pages_fetched,
            run.stop.describe()
        );

        if let StopReason::Fatal(e) = run.stop {
            anyhow::bail!("source unreachable: {}", e);
        }
    }

    println!();
    if confirmed == 0 {
        println!(
            "{} No strategy paginated successfully",
            style("!").yellow()
        );
    } else {
        println!(
            "{} {} of {} strategies paginate",
            style("✓").green(),
            confirmed,
            strategies.len()
        );
    }
    Ok(())
}
