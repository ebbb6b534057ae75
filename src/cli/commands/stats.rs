//! Store statistics.

use console::style;

use crate::config::Settings;
use crate::repository::DieselMessageRepository;

pub async fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let repo = DieselMessageRepository::open(&settings.database_url).await?;
    let stats = repo.stats().await?;

    println!("\n{}", style("Message store").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Database:", settings.database_url);
    println!("{:<20} {}", "Total messages:", stats.total);
    println!("{:<20} {}", "Legacy imports:", stats.legacy);
    println!("{:<20} {}", "Approved:", stats.approved);

    Ok(())
}
