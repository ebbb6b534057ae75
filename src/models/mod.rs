//! Data models for the legacy guestbook import.

mod message;
mod record;

pub use message::{ModerationState, PersistedMessage};
pub use record::{CandidateRecord, RawPage, ANONYMOUS_AUTHOR};
