//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod import;
mod pipeline;
mod probe;
mod stats;
mod summary;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, Settings};

#[derive(Parser)]
#[command(name = "guestbook-import")]
#[command(about = "Crawl a legacy memorial guestbook and import its messages")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: ./guestbook-import.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Board page listing the legacy comments
    #[arg(long, global = true, env = "GUESTBOOK_SOURCE_URL")]
    source_url: Option<String>,

    /// SQLite database holding the message store
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Checkpoint file for crawled records
    #[arg(long, global = true, env = "GUESTBOOK_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Crawl tuning shared by the commands that fetch pages.
#[derive(clap::Args, Debug, Default, Clone)]
struct CrawlArgs {
    /// Strategy to try, in order (repeatable; e.g. query:page, form-post:cPage)
    #[arg(short, long = "strategy")]
    strategies: Vec<String>,

    /// Last page number to request
    #[arg(long)]
    max_pages: Option<u32>,

    /// Delay between requests in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Number of records the source is expected to hold (for the summary)
    #[arg(long)]
    expected: Option<usize>,
}

impl CrawlArgs {
    fn apply(&self, settings: &mut Settings) {
        if !self.strategies.is_empty() {
            settings.strategies = self.strategies.clone();
        }
        if let Some(max_pages) = self.max_pages {
            settings.max_pages = max_pages;
        }
        if let Some(delay) = self.delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(expected) = self.expected {
            settings.expected_records = Some(expected);
        }
    }
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Probe strategies, crawl, checkpoint and import (the default)
    Run {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Crawl and write the checkpoint without touching the store
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Import a previously written checkpoint into the store
    Import,

    /// Fetch the first pages with each strategy and report which paginate
    Probe {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Show message counts in the store
    Stats,
}

impl Commands {
    fn crawl_args(&self) -> Option<&CrawlArgs> {
        match self {
            Self::Run { crawl } | Self::Crawl { crawl } | Self::Probe { crawl } => Some(crawl),
            Self::Import | Self::Stats => None,
        }
    }
}

impl Cli {
    fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            crawl: CrawlArgs::default(),
        })
    }

    /// Defaults, then the config file, then env/flags, then the command's
    /// own flags. Validated for every command.
    async fn settings(&self, command: &Commands) -> anyhow::Result<Settings> {
        let config = Config::discover(self.config.as_deref()).await?;
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        if let Some(ref url) = self.source_url {
            settings.source_url = Some(url.clone());
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = url.clone();
        }
        if let Some(ref path) = self.checkpoint {
            settings.checkpoint_path = path.clone();
        }
        if let Some(crawl) = command.crawl_args() {
            crawl.apply(&mut settings);
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command();
    let settings = cli.settings(&command).await?;

    match command {
        Commands::Run { .. } => pipeline::cmd_run(&settings).await,
        Commands::Crawl { .. } => pipeline::cmd_crawl(&settings).await,
        Commands::Import => import::cmd_import(&settings).await,
        Commands::Probe { .. } => probe::cmd_probe(&settings).await,
        Commands::Stats => stats::cmd_stats(&settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settings_for(args: &[&str], config: &str) -> anyhow::Result<Settings> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guestbook-import.toml");
        std::fs::write(&path, config).unwrap();

        let mut argv = vec!["guestbook-import", "--config", path.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        cli.settings(&cli.command()).await
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_for_store_commands() {
        for command in ["import", "stats"] {
            let result = settings_for(&[command], "fingerprint_prefix_chars = 0\n").await;
            assert!(result.is_err(), "{} accepted a zero prefix", command);
        }
    }

    #[tokio::test]
    async fn test_crawl_flags_apply_before_validation() {
        let settings = settings_for(&["crawl", "--max-pages", "40", "-s", "form-post:cPage"], "")
            .await
            .unwrap();
        assert_eq!(settings.max_pages, 40);
        assert_eq!(settings.strategies, vec!["form-post:cPage".to_string()]);

        let result = settings_for(&["run", "-s", "bogus"], "").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["guestbook-import"]).unwrap();
        assert!(matches!(cli.command(), Commands::Run { .. }));
    }
}
