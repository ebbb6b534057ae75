//! Repository layer for the destination message store.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against a SQLite database.

pub mod message;
pub mod models;
pub mod pool;
pub mod store;
mod util;

pub use message::{DieselMessageRepository, MessageStats};
pub use models::{MessageRecord, NewMessage};
pub use pool::{AsyncSqlitePool, DbError};
pub use store::{MessageStore, StoreError};
