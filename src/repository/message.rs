//! Diesel-based message repository for SQLite.

use async_trait::async_trait;
use chrono::DateTime;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{MessageRecord, NewMessage};
use super::pool::{AsyncSqlitePool, DbError};
use super::store::{MessageStore, StoreError};
use super::util::parse_datetime;
use crate::models::{ModerationState, PersistedMessage};
use crate::schema::messages;

/// Convert a database record to a domain model.
impl From<MessageRecord> for PersistedMessage {
    fn from(record: MessageRecord) -> Self {
        let moderation = ModerationState::from_str(&record.moderation).unwrap_or(
            if record.is_approved != 0 {
                ModerationState::Approved
            } else {
                ModerationState::Pending
            },
        );
        PersistedMessage {
            id: record.id,
            author: record.author,
            content: record.content,
            created_at: parse_datetime(&record.created_at).unwrap_or(DateTime::UNIX_EPOCH),
            is_legacy: record.is_legacy != 0,
            moderation,
            likes: record.likes.max(0) as u32,
            report_count: record.report_count.max(0) as u32,
        }
    }
}

/// Message counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub total: u64,
    pub legacy: u64,
    pub approved: u64,
}

/// Diesel-based message repository.
#[derive(Clone)]
pub struct DieselMessageRepository {
    pool: AsyncSqlitePool,
}

impl DieselMessageRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database, creating the schema if needed.
    pub async fn open(database_url: &str) -> Result<Self, DbError> {
        let pool = AsyncSqlitePool::new(database_url);
        pool.init_schema().await?;
        Ok(Self::new(pool))
    }

    pub async fn get(&self, id: &str) -> Result<Option<PersistedMessage>, DbError> {
        let mut conn = self.pool.get().await?;

        messages::table
            .find(id)
            .select(MessageRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(PersistedMessage::from))
    }

    pub async fn get_all(&self) -> Result<Vec<PersistedMessage>, DbError> {
        let mut conn = self.pool.get().await?;

        messages::table
            .order(messages::created_at.asc())
            .select(MessageRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(PersistedMessage::from).collect())
    }

    /// Insert a message. Fails if the id already exists.
    pub async fn insert(&self, message: &PersistedMessage) -> Result<(), StoreError> {
        let likes = to_column(&message.id, "likes", message.likes)?;
        let report_count = to_column(&message.id, "report_count", message.report_count)?;
        let created_at = message.created_at.to_rfc3339();

        let new = NewMessage {
            id: &message.id,
            author: &message.author,
            content: &message.content,
            created_at: &created_at,
            is_approved: message.is_approved() as i32,
            is_legacy: message.is_legacy as i32,
            moderation: message.moderation.as_str(),
            likes,
            report_count,
        };

        let mut conn = self.pool.get().await?;
        diesel::insert_into(messages::table)
            .values(&new)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn stats(&self) -> Result<MessageStats, DbError> {
        use diesel::dsl::count_star;

        let mut conn = self.pool.get().await?;

        let total: i64 = messages::table
            .select(count_star())
            .first(&mut conn)
            .await?;
        let legacy: i64 = messages::table
            .filter(messages::is_legacy.ne(0))
            .select(count_star())
            .first(&mut conn)
            .await?;
        let approved: i64 = messages::table
            .filter(messages::is_approved.ne(0))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(MessageStats {
            total: total as u64,
            legacy: legacy as u64,
            approved: approved as u64,
        })
    }
}

fn to_column(id: &str, field: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::InvalidRecord {
        id: id.to_string(),
        reason: format!("{} out of range: {}", field, value),
    })
}

#[async_trait]
impl MessageStore for DieselMessageRepository {
    async fn load_all(&self) -> Result<Vec<PersistedMessage>, StoreError> {
        Ok(self.get_all().await?)
    }

    async fn insert(&self, message: &PersistedMessage) -> Result<(), StoreError> {
        DieselMessageRepository::insert(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselMessageRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = DieselMessageRepository::open(&db_path.display().to_string())
            .await
            .unwrap();
        (repo, dir)
    }

    fn record(author: &str, content: &str) -> CandidateRecord {
        CandidateRecord {
            author: author.to_string(),
            content: content.to_string(),
            date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
            source_page: 1,
            source_strategy: "query:page".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let (repo, _dir) = setup_test_db().await;
        let message = PersistedMessage::legacy_import(&record("민수", "그립습니다 늘 기억할게요"));

        repo.insert(&message).await.unwrap();

        let fetched = repo.get(&message.id).await.unwrap().unwrap();
        assert_eq!(fetched, message);
        assert_eq!(repo.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let (repo, _dir) = setup_test_db().await;
        let message = PersistedMessage::legacy_import(&record("민수", "그립습니다 늘 기억할게요"));

        repo.insert(&message).await.unwrap();
        assert!(repo.insert(&message).await.is_err());
    }

    #[tokio::test]
    async fn test_stats_counts_by_kind() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert(&PersistedMessage::legacy_import(&record("a", "첫 번째 메시지")))
            .await
            .unwrap();

        let mut native = PersistedMessage::legacy_import(&record("b", "두 번째 메시지"));
        native.is_legacy = false;
        native.moderation = ModerationState::Pending;
        repo.insert(&native).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            MessageStats {
                total: 2,
                legacy: 1,
                approved: 1
            }
        );
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempdir().unwrap();
        let url = dir.path().join("test.db").display().to_string();

        let repo = DieselMessageRepository::open(&url).await.unwrap();
        repo.insert(&PersistedMessage::legacy_import(&record("a", "첫 번째 메시지")))
            .await
            .unwrap();

        let reopened = DieselMessageRepository::open(&url).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total, 1);
    }
}
