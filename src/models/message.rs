//! Long-lived guestbook message owned by the destination store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CandidateRecord;

/// Moderation state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationState {
    Pending,
    Approved,
    Rejected,
}

impl ModerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A message document in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// True for messages imported from the legacy crawl.
    pub is_legacy: bool,
    pub moderation: ModerationState,
    pub likes: u32,
    pub report_count: u32,
}

impl PersistedMessage {
    /// Build a pre-approved legacy import from a crawled record.
    pub fn legacy_import(record: &CandidateRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: record.author.clone(),
            content: record.content.clone(),
            created_at: record.created_at(),
            is_legacy: true,
            moderation: ModerationState::Approved,
            likes: 0,
            report_count: 0,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.moderation == ModerationState::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_legacy_import_defaults() {
        let record = CandidateRecord {
            author: "민수".to_string(),
            content: "그립습니다 많이".to_string(),
            date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
            source_page: 2,
            source_strategy: "query:page".to_string(),
        };
        let msg = PersistedMessage::legacy_import(&record);
        assert!(msg.is_legacy);
        assert!(msg.is_approved());
        assert_eq!(msg.likes, 0);
        assert_eq!(msg.report_count, 0);
        assert_eq!(msg.author, "민수");
        assert_eq!(msg.created_at, record.created_at());
    }

    #[test]
    fn test_moderation_round_trip_strings() {
        for state in [
            ModerationState::Pending,
            ModerationState::Approved,
            ModerationState::Rejected,
        ] {
            assert_eq!(ModerationState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(ModerationState::from_str("bogus"), None);
    }
}
