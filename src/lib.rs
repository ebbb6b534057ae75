//! guestbook-import - legacy memorial guestbook migration.
//!
//! Crawls a paginated comment board whose pagination mechanism is unknown,
//! extracts and deduplicates the comments, and imports them idempotently
//! into the message store.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;
