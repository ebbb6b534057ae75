//! Fingerprint-based record deduplication.
//!
//! A fingerprint is derived from the author and a fixed-length prefix of the
//! content, so the same comment seen on different pages, through different
//! pagination strategies, or already sitting in the store maps to one key.

use std::collections::HashSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::{CandidateRecord, PersistedMessage};

/// Default number of content characters that take part in a fingerprint.
pub const DEFAULT_PREFIX_CHARS: usize = 150;

/// Stable dedup key for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an (author, content) pair.
    ///
    /// Whitespace in the content is collapsed before the prefix is taken, and
    /// the prefix is counted in characters so multi-byte text is never split.
    pub fn compute(author: &str, content: &str, prefix_chars: usize) -> Self {
        let normalized = collapse_whitespace(content);
        let prefix: String = normalized.chars().take(prefix_chars).collect();

        let mut hasher = Sha256::new();
        hasher.update(author.trim().as_bytes());
        hasher.update([0x1f]);
        hasher.update(prefix.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn of_record(record: &CandidateRecord, prefix_chars: usize) -> Self {
        Self::compute(&record.author, &record.content, prefix_chars)
    }

    pub fn of_message(message: &PersistedMessage, prefix_chars: usize) -> Self {
        Self::compute(&message.author, &message.content, prefix_chars)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Set of fingerprints already seen during one pipeline run.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    seen: HashSet<Fingerprint>,
    prefix_chars: usize,
}

impl Deduplicator {
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            seen: HashSet::new(),
            prefix_chars,
        }
    }

    /// Build a deduplicator already holding the fingerprints of existing messages.
    pub fn seeded<'a>(
        prefix_chars: usize,
        existing: impl IntoIterator<Item = &'a PersistedMessage>,
    ) -> Self {
        let mut dedup = Self::new(prefix_chars);
        dedup.seed(existing);
        dedup
    }

    /// Mark every existing message as seen.
    pub fn seed<'a>(&mut self, existing: impl IntoIterator<Item = &'a PersistedMessage>) {
        for message in existing {
            self.seen
                .insert(Fingerprint::of_message(message, self.prefix_chars));
        }
    }

    pub fn fingerprint(&self, record: &CandidateRecord) -> Fingerprint {
        Fingerprint::of_record(record, self.prefix_chars)
    }

    pub fn seen(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn mark_seen(&mut self, fingerprint: Fingerprint) {
        self.seen.insert(fingerprint);
    }

    /// Returns true if the record was new (and marks it seen).
    pub fn check_and_mark(&mut self, record: &CandidateRecord) -> bool {
        let fingerprint = self.fingerprint(record);
        self.seen.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_CHARS)
    }
}
