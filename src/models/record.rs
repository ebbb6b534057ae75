//! Transient models produced while crawling the remote board.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Author used when a record carries no parseable author/date suffix.
pub const ANONYMOUS_AUTHOR: &str = "anonymous";

/// One fetched page of the remote board. Never persisted.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// 1-based page index that was requested.
    pub page: u32,
    /// Id of the pagination strategy used to fetch it.
    pub strategy: String,
    /// Raw markup.
    pub body: String,
    /// HTTP status of the final response.
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn new(page: u32, strategy: impl Into<String>, body: impl Into<String>, status: u16) -> Self {
        Self {
            page,
            strategy: strategy.into(),
            body: body.into(),
            status,
            fetched_at: Utc::now(),
        }
    }
}

/// A visitor comment extracted from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub author: String,
    pub content: String,
    /// ISO date (`YYYY-MM-DD`).
    pub date: NaiveDate,
    pub source_page: u32,
    pub source_strategy: String,
}

impl CandidateRecord {
    /// Timestamp stored for the record: its date at midnight UTC.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.date.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}
