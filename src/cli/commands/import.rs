//! Import a checkpoint into the store.

use console::style;

use super::pipeline::{print_import_hint, CtrlCWatch};
use super::summary::print_summary;
use crate::config::Settings;
use crate::repository::DieselMessageRepository;
use crate::services::Checkpoint;

pub async fn cmd_import(settings: &Settings) -> anyhow::Result<()> {
    let ctrl_c = CtrlCWatch::start();
    let checkpoint = Checkpoint::load(&settings.checkpoint_path).await?;
    println!(
        "{} {} records from {} (crawled {} from {})",
        style("→").cyan(),
        checkpoint.records.len(),
        settings.checkpoint_path.display(),
        checkpoint.generated_at.format("%Y-%m-%d %H:%M"),
        checkpoint.source_url
    );

    settings.ensure_database_dir()?;
    let repo = DieselMessageRepository::open(&settings.database_url).await?;
    let report = settings
        .upserter()
        .with_cancel_flag(ctrl_c.flag())
        .upsert(&checkpoint.records, &repo)
        .await?;

    print_summary(None, Some(&report), None);
    if report.interrupted > 0 {
        print_import_hint();
    }
    Ok(())
}
