//! The destination-store seam used by the import phase.

use async_trait::async_trait;
use thiserror::Error;

use super::pool::DbError;
use crate::models::PersistedMessage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("invalid message {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// A store of guestbook messages. The pipeline only reads and adds.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every message currently in the store.
    async fn load_all(&self) -> Result<Vec<PersistedMessage>, StoreError>;

    /// Add one message.
    async fn insert(&self, message: &PersistedMessage) -> Result<(), StoreError>;
}
