//! Idempotent import of crawled records into the message store.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::models::{CandidateRecord, PersistedMessage};
use crate::repository::{MessageStore, StoreError};
use crate::scrapers::dedup::{Deduplicator, DEFAULT_PREFIX_CHARS};
use crate::scrapers::CancelFlag;

/// Default number of writes in flight at once.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 4;

/// Result of an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    /// New records left unwritten because the run was cancelled.
    pub interrupted: usize,
}

/// Adds records the store does not already hold.
#[derive(Debug, Clone)]
pub struct StoreUpserter {
    prefix_chars: usize,
    write_concurrency: usize,
    cancel: CancelFlag,
}

impl StoreUpserter {
    pub fn new(prefix_chars: usize, write_concurrency: usize) -> Self {
        Self {
            prefix_chars,
            write_concurrency: write_concurrency.max(1),
            cancel: CancelFlag::new(),
        }
    }

    /// Stop starting new writes once `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create-if-absent import of `records`.
    ///
    /// The store is read once and fingerprinted before any write, so running
    /// this again with the same records adds nothing. Individual write
    /// failures are counted, not returned; only failing to read the store
    /// is an error.
    pub async fn upsert<S>(
        &self,
        records: &[CandidateRecord],
        store: &S,
    ) -> Result<UpsertReport, StoreError>
    where
        S: MessageStore + ?Sized,
    {
        let existing = store.load_all().await?;
        let mut dedup = Deduplicator::seeded(self.prefix_chars, &existing);
        debug!("Seeded {} fingerprints from the store", dedup.len());

        let mut report = UpsertReport::default();
        let mut pending = Vec::new();
        for record in records {
            if dedup.check_and_mark(record) {
                pending.push(PersistedMessage::legacy_import(record));
            } else {
                report.skipped += 1;
            }
        }

        let cancel = &self.cancel;
        let results: Vec<(&PersistedMessage, Option<Result<(), StoreError>>)> =
            stream::iter(&pending)
                .map(|message| async move {
                    if cancel.is_cancelled() {
                        return (message, None);
                    }
                    (message, Some(store.insert(message).await))
                })
                .buffer_unordered(self.write_concurrency)
                .collect()
                .await;

        for (message, result) in results {
            match result {
                None => report.interrupted += 1,
                Some(Ok(())) => report.added += 1,
                Some(Err(e)) => {
                    warn!(
                        "Failed to write message by {} ({}): {}",
                        message.author, message.created_at, e
                    );
                    report.failed += 1;
                }
            }
        }

        if report.interrupted > 0 {
            warn!("Upsert cancelled with {} records unwritten", report.interrupted);
        }
        info!(
            "Upsert: {} added, {} skipped, {} failed",
            report.added, report.skipped, report.failed
        );
        Ok(report)
    }
}

impl Default for StoreUpserter {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_CHARS, DEFAULT_WRITE_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// In-memory store that can refuse writes by author.
    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<PersistedMessage>>,
        reject_author: Option<String>,
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn load_all(&self) -> Result<Vec<PersistedMessage>, StoreError> {
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn insert(&self, message: &PersistedMessage) -> Result<(), StoreError> {
            if self.reject_author.as_deref() == Some(message.author.as_str()) {
                return Err(StoreError::InvalidRecord {
                    id: message.id.clone(),
                    reason: "rejected".to_string(),
                });
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn record(author: &str, content: &str) -> CandidateRecord {
        CandidateRecord {
            author: author.to_string(),
            content: content.to_string(),
            date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            source_page: 1,
            source_strategy: "query:page".to_string(),
        }
    }

    fn records() -> Vec<CandidateRecord> {
        vec![
            record("민수", "그립습니다 항상 기억할게요"),
            record("영희", "좋은 곳에서 편히 쉬세요"),
            record("anonymous", "노래 고맙습니다"),
        ]
    }

    #[tokio::test]
    async fn test_second_run_adds_nothing() {
        let store = MemoryStore::default();
        let upserter = StoreUpserter::default();

        let first = upserter.upsert(&records(), &store).await.unwrap();
        assert_eq!(first.added, 3);

        let second = upserter.upsert(&records(), &store).await.unwrap();
        assert_eq!(
            second,
            UpsertReport {
                added: 0,
                skipped: 3,
                failed: 0,
                interrupted: 0
            }
        );
        assert_eq!(store.messages.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_new_messages_are_approved_legacy_imports() {
        let store = MemoryStore::default();
        StoreUpserter::default()
            .upsert(&records()[..1], &store)
            .await
            .unwrap();

        let messages = store.messages.lock().unwrap();
        let message = &messages[0];
        assert!(message.is_legacy);
        assert!(message.is_approved());
        assert_eq!(message.likes, 0);
        assert_eq!(message.report_count, 0);
        assert_eq!(message.created_at.to_rfc3339(), "2020-05-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_duplicates_within_input_are_skipped() {
        let store = MemoryStore::default();
        let mut input = records();
        input.push(record("민수", "그립습니다   항상 기억할게요"));

        let report = StoreUpserter::default().upsert(&input, &store).await.unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_abort_batch() {
        let store = MemoryStore {
            reject_author: Some("영희".to_string()),
            ..Default::default()
        };

        let report = StoreUpserter::new(150, 2)
            .upsert(&records(), &store)
            .await
            .unwrap();

        assert_eq!(
            report,
            UpsertReport {
                added: 2,
                skipped: 0,
                failed: 1,
                interrupted: 0
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_upsert_stops_writing() {
        let store = MemoryStore::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = StoreUpserter::default()
            .with_cancel_flag(cancel)
            .upsert(&records(), &store)
            .await
            .unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.interrupted, 3);
        assert!(store.messages.lock().unwrap().is_empty());

        let resumed = StoreUpserter::default()
            .upsert(&records(), &store)
            .await
            .unwrap();
        assert_eq!(resumed.added, 3);
    }
}
