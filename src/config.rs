//! Configuration for guestbook-import.
//!
//! Built-in defaults are overlaid by an optional TOML file, then by
//! environment variables and command-line flags (handled by the CLI).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::scrapers::dedup::DEFAULT_PREFIX_CHARS;
use crate::scrapers::extract::{
    DEFAULT_BOILERPLATE_LABELS, DEFAULT_MIN_CONTENT_CHARS, DEFAULT_RECORD_SELECTORS,
};
use crate::scrapers::strategy::{
    UnknownStrategy, DEFAULT_PAGE_INDICATOR_SELECTORS, DEFAULT_PAGE_SIZE,
};
use crate::scrapers::{
    CrawlSettings, FetchError, HttpClient, PaginationDetector, RecordExtractor, Strategy,
};
use crate::services::{StoreUpserter, DEFAULT_WRITE_CONCURRENCY};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "guestbook-import.toml";

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "guestbook.db";

/// Default checkpoint file, relative to the working directory.
pub const DEFAULT_CHECKPOINT_PATH: &str = "legacy-messages.json";

/// Default strategy probing order.
pub const DEFAULT_STRATEGIES: &[&str] = &[
    "query:page",
    "query:p",
    "offset-limit",
    "form-post:cPage",
    "hash:gopage",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Board page listing the legacy comments.
    pub source_url: Option<String>,
    /// SQLite database holding the message store.
    pub database_url: String,
    pub checkpoint_path: PathBuf,
    /// None = crate user agent, "impersonate" = real browser agent.
    pub user_agent: Option<String>,
    pub request_timeout_secs: u64,
    /// Fixed delay between requests to the source.
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub first_page: u32,
    pub max_pages: u32,
    pub page_size: u32,
    pub max_consecutive_empty: u32,
    pub empty_grace_pages: u32,
    pub success_threshold: usize,
    pub min_content_chars: usize,
    pub fingerprint_prefix_chars: usize,
    pub write_concurrency: usize,
    pub strategies: Vec<String>,
    pub record_selectors: Vec<String>,
    pub page_indicator_selectors: Vec<String>,
    pub boilerplate_labels: Vec<String>,
    /// Record count the operator expects, for the summary.
    pub expected_records: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("guestbook-import");

        Self {
            source_url: None,
            database_url: format!(
                "sqlite:{}",
                data_dir.join(DEFAULT_DATABASE_FILENAME).display()
            ),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            user_agent: None,
            request_timeout_secs: 30,
            request_delay_ms: 1500,
            max_retries: 2,
            retry_delay_ms: 2000,
            first_page: 1,
            max_pages: 300,
            page_size: DEFAULT_PAGE_SIZE,
            max_consecutive_empty: 5,
            empty_grace_pages: 10,
            success_threshold: 50,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            fingerprint_prefix_chars: DEFAULT_PREFIX_CHARS,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            strategies: to_strings(DEFAULT_STRATEGIES),
            record_selectors: to_strings(DEFAULT_RECORD_SELECTORS),
            page_indicator_selectors: to_strings(DEFAULT_PAGE_INDICATOR_SELECTORS),
            boilerplate_labels: to_strings(DEFAULT_BOILERPLATE_LABELS),
            expected_records: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Parsed source URL; required by every command that crawls.
    pub fn source_url(&self) -> Result<Url, ConfigError> {
        let raw = self.source_url.as_deref().ok_or_else(|| {
            ConfigError::invalid(
                "source_url",
                "not set (use --source-url, GUESTBOOK_SOURCE_URL or the config file)",
            )
        })?;
        Url::parse(raw).map_err(|e| ConfigError::invalid("source_url", e.to_string()))
    }

    /// Strategies in probing order.
    pub fn strategies(&self) -> Result<Vec<Strategy>, ConfigError> {
        self.strategies
            .iter()
            .map(|s| {
                let strategy: Strategy = s
                    .parse()
                    .map_err(|e: UnknownStrategy| {
                        ConfigError::invalid("strategies", e.to_string())
                    })?;
                Ok(match strategy {
                    // A bare "offset-limit" takes the configured page size.
                    Strategy::OffsetLimit { .. } if s == "offset-limit" => Strategy::OffsetLimit {
                        page_size: self.page_size,
                    },
                    other => other,
                })
            })
            .collect()
    }

    /// Check values that would make the crawl meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be positive"));
        }
        if self.first_page == 0 || self.first_page > self.max_pages {
            return Err(ConfigError::invalid(
                "first_page",
                format!("must be between 1 and max_pages ({})", self.max_pages),
            ));
        }
        if self.max_consecutive_empty == 0 {
            return Err(ConfigError::invalid("max_consecutive_empty", "must be positive"));
        }
        if self.write_concurrency == 0 {
            return Err(ConfigError::invalid("write_concurrency", "must be positive"));
        }
        if self.fingerprint_prefix_chars == 0 {
            return Err(ConfigError::invalid(
                "fingerprint_prefix_chars",
                "must be positive",
            ));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::invalid("strategies", "at least one is required"));
        }
        self.strategies()?;
        Ok(())
    }

    /// Create the directory holding a file-backed SQLite database.
    pub fn ensure_database_dir(&self) -> std::io::Result<()> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))
            .unwrap_or(&self.database_url);
        if path == ":memory:" {
            return Ok(());
        }
        match Path::new(path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            first_page: self.first_page,
            max_pages: self.max_pages,
            max_consecutive_empty: self.max_consecutive_empty,
            empty_grace_pages: self.empty_grace_pages,
            success_threshold: self.success_threshold,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn extractor(&self) -> RecordExtractor {
        RecordExtractor::new(
            &self.record_selectors,
            &self.boilerplate_labels,
            self.min_content_chars,
        )
    }

    pub fn detector(&self) -> PaginationDetector {
        PaginationDetector::new(&self.page_indicator_selectors)
    }

    pub fn upserter(&self) -> StoreUpserter {
        StoreUpserter::new(self.fingerprint_prefix_chars, self.write_concurrency)
    }

    pub fn http_client(&self) -> Result<HttpClient, FetchError> {
        HttpClient::new(
            Duration::from_secs(self.request_timeout_secs),
            Duration::from_millis(self.request_delay_ms),
            self.user_agent.as_deref(),
        )
    }
}

/// Configuration file structure. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_empty: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_grace_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_content_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_prefix_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_selectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_indicator_selectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boilerplate_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_records: Option<usize>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `explicit` if given, else the default file in the working
    /// directory if present, else an empty config.
    pub async fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from_path(path).await,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILENAME);
                if tokio::fs::try_exists(default).await.unwrap_or(false) {
                    Self::load_from_path(default).await
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        let base_dir = self.base_dir();

        if let Some(ref url) = self.source_url {
            settings.source_url = Some(url.clone());
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = url.clone();
        }
        if let Some(ref path) = self.checkpoint_path {
            let path = PathBuf::from(path);
            settings.checkpoint_path = match base_dir {
                Some(ref dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(v) = self.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
        if let Some(v) = self.request_delay_ms {
            settings.request_delay_ms = v;
        }
        if let Some(v) = self.max_retries {
            settings.max_retries = v;
        }
        if let Some(v) = self.retry_delay_ms {
            settings.retry_delay_ms = v;
        }
        if let Some(v) = self.first_page {
            settings.first_page = v;
        }
        if let Some(v) = self.max_pages {
            settings.max_pages = v;
        }
        if let Some(v) = self.page_size {
            settings.page_size = v;
        }
        if let Some(v) = self.max_consecutive_empty {
            settings.max_consecutive_empty = v;
        }
        if let Some(v) = self.empty_grace_pages {
            settings.empty_grace_pages = v;
        }
        if let Some(v) = self.success_threshold {
            settings.success_threshold = v;
        }
        if let Some(v) = self.min_content_chars {
            settings.min_content_chars = v;
        }
        if let Some(v) = self.fingerprint_prefix_chars {
            settings.fingerprint_prefix_chars = v;
        }
        if let Some(v) = self.write_concurrency {
            settings.write_concurrency = v;
        }
        if let Some(ref v) = self.strategies {
            settings.strategies = v.clone();
        }
        if let Some(ref v) = self.record_selectors {
            settings.record_selectors = v.clone();
        }
        if let Some(ref v) = self.page_indicator_selectors {
            settings.page_indicator_selectors = v.clone();
        }
        if let Some(ref v) = self.boilerplate_labels {
            settings.boilerplate_labels = v.clone();
        }
        if let Some(v) = self.expected_records {
            settings.expected_records = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.request_delay_ms, 1500);
        assert_eq!(settings.success_threshold, 50);
        assert_eq!(settings.fingerprint_prefix_chars, 150);
        assert!(settings.database_url.ends_with("guestbook.db"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_strategy_order() {
        let strategies = Settings::default().strategies().unwrap();
        let ids: Vec<String> = strategies.iter().map(|s| s.id()).collect();
        assert_eq!(
            ids,
            vec!["query:page", "query:p", "offset-limit", "form-post:cPage", "hash:gopage"]
        );
    }

    #[test]
    fn test_bare_offset_limit_uses_page_size() {
        let settings = Settings {
            page_size: 20,
            strategies: vec!["offset-limit".to_string(), "offset-limit:15".to_string()],
            ..Default::default()
        };
        assert_eq!(
            settings.strategies().unwrap(),
            vec![
                Strategy::OffsetLimit { page_size: 20 },
                Strategy::OffsetLimit { page_size: 15 }
            ]
        );
    }

    #[test]
    fn test_unknown_strategy_is_invalid() {
        let settings = Settings {
            strategies: vec!["cursor:next".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                key: "strategies",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_source_url() {
        assert!(Settings::default().source_url().is_err());
    }

    #[tokio::test]
    async fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guestbook-import.toml");
        std::fs::write(
            &path,
            r#"
source_url = "https://memorial.example.go.kr/board/comments"
checkpoint_path = "out/legacy.json"
request_delay_ms = 3000
strategies = ["form-post:cPage", "query:page"]
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        assert_eq!(settings.request_delay_ms, 3000);
        assert_eq!(settings.checkpoint_path, dir.path().join("out/legacy.json"));
        assert_eq!(settings.strategies().unwrap().len(), 2);
        assert_eq!(
            settings.source_url().unwrap().as_str(),
            "https://memorial.example.go.kr/board/comments"
        );
        assert_eq!(settings.max_pages, 300);
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "request_dealy_ms = 10\n").unwrap();

        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(ConfigError::Toml { .. })
        ));
    }
}
