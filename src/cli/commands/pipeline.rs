//! The crawl-then-import pipeline commands.

use std::sync::Arc;

use console::style;
use tokio::task::JoinHandle;
use tracing::info;

use super::summary::{print_summary, should_fail};
use crate::cli::progress::CrawlProgress;
use crate::config::Settings;
use crate::repository::{DieselMessageRepository, MessageStore};
use crate::scrapers::{CancelFlag, CrawlReport, Deduplicator, RunAccumulator};
use crate::services::Checkpoint;

/// Sets a [`CancelFlag`] on Ctrl-C for as long as it is alive.
///
/// Listening replaces the default SIGINT handler for the rest of the
/// process, so one watcher must cover every phase of a command.
pub(super) struct CtrlCWatch {
    flag: CancelFlag,
    task: JoinHandle<()>,
}

impl CtrlCWatch {
    pub(super) fn start() -> Self {
        let flag = CancelFlag::new();
        let task_flag = flag.clone();
        let task = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                task_flag.cancel();
            }
        });
        Self { flag, task }
    }

    pub(super) fn flag(&self) -> CancelFlag {
        self.flag.clone()
    }
}

impl Drop for CtrlCWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Probe strategies, crawl, checkpoint, then import into the store.
pub async fn cmd_run(settings: &Settings) -> anyhow::Result<()> {
    let ctrl_c = CtrlCWatch::start();
    settings.ensure_database_dir()?;
    let repo = DieselMessageRepository::open(&settings.database_url).await?;

    let existing = repo.load_all().await?;
    println!(
        "{} {} messages already in the store",
        style("→").cyan(),
        existing.len()
    );
    let dedup = Deduplicator::seeded(settings.fingerprint_prefix_chars, &existing);

    let report = crawl_source(settings, dedup, ctrl_c.flag()).await?;
    write_checkpoint(settings, &report).await?;

    if report.cancelled {
        println!(
            "{} Interrupted: store not updated. Run 'guestbook-import import' to import the checkpoint.",
            style("!").yellow()
        );
        print_summary(Some(&report), None, settings.expected_records);
        return Ok(());
    }

    let upsert = if report.records.is_empty() {
        None
    } else {
        Some(
            settings
                .upserter()
                .with_cancel_flag(ctrl_c.flag())
                .upsert(&report.records, &repo)
                .await?,
        )
    };

    print_summary(Some(&report), upsert.as_ref(), settings.expected_records);
    if upsert.is_some_and(|u| u.interrupted > 0) {
        print_import_hint();
    }

    if should_fail(&report) {
        anyhow::bail!("no source data could be retrieved");
    }
    Ok(())
}

/// Crawl and checkpoint only.
pub async fn cmd_crawl(settings: &Settings) -> anyhow::Result<()> {
    let ctrl_c = CtrlCWatch::start();
    let dedup = Deduplicator::new(settings.fingerprint_prefix_chars);
    let report = crawl_source(settings, dedup, ctrl_c.flag()).await?;
    write_checkpoint(settings, &report).await?;

    print_summary(Some(&report), None, settings.expected_records);

    if should_fail(&report) {
        anyhow::bail!("no source data could be retrieved");
    }
    Ok(())
}

/// Run every configured strategy against the source. Ctrl-C stops the crawl
/// between pages and keeps what was collected.
async fn crawl_source(
    settings: &Settings,
    dedup: Deduplicator,
    cancel: CancelFlag,
) -> anyhow::Result<CrawlReport> {
    let url = settings.source_url()?;
    let strategies = settings.strategies()?;
    let client = settings.http_client()?;

    println!(
        "{} Crawling {} ({} strategies, pages {}-{})",
        style("→").cyan(),
        style(&url).bold(),
        strategies.len(),
        settings.first_page,
        settings.max_pages
    );

    let progress = Arc::new(CrawlProgress::new());
    let mut accumulator = RunAccumulator::new(Arc::new(client), url, settings.crawl_settings())
        .with_extractor(settings.extractor())
        .with_detector(settings.detector())
        .with_deduplicator(dedup)
        .with_cancel_flag(cancel)
        .with_observer(progress.clone());

    let report = accumulator.crawl(&strategies).await;
    progress.finish();

    if let Some(winner) = report.winning_strategy(settings.success_threshold) {
        info!("Pagination strategy {} confirmed", winner);
    }
    Ok(report)
}

/// Re-importing is idempotent, so an interrupted upsert resumes from the
/// checkpoint.
pub(super) fn print_import_hint() {
    println!(
        "{} Import interrupted. Run 'guestbook-import import' to finish from the checkpoint.",
        style("!").yellow()
    );
}

async fn write_checkpoint(settings: &Settings, report: &CrawlReport) -> anyhow::Result<()> {
    if report.records.is_empty() {
        println!("{} No new records to checkpoint", style("!").yellow());
        return Ok(());
    }

    let source = settings.source_url.clone().unwrap_or_default();
    Checkpoint::new(source, report.records.clone())
        .save(&settings.checkpoint_path)
        .await?;
    println!(
        "{} Wrote {} records to {}",
        style("✓").green(),
        report.records.len(),
        settings.checkpoint_path.display()
    );
    Ok(())
}
