//! Service layer: the import phase and the crawl checkpoint.
//!
//! Kept separate from the CLI so other front ends can drive the pipeline.

pub mod checkpoint;
pub mod upsert;

pub use checkpoint::{Checkpoint, CheckpointError};
pub use upsert::{StoreUpserter, UpsertReport, DEFAULT_WRITE_CONCURRENCY};
