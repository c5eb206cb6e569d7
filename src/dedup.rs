//! Content-hash deduplication across pipeline runs.
//!
//! Each fragment headed for embedding is hashed over a canonical
//! `Source/Title/Text` representation. The registry is seeded from the
//! persisted embedding records at the start of a run, guaranteeing
//! at-most-one embedding per unique canonical content even across repeated
//! runs over an unchanged or overlapping corpus.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, EmbeddingRecord};

/// Canonical representation hashed for deduplication. Also the exact text
/// sent to the embedding provider, so the hash covers what was embedded.
pub fn canonical_input(source: &str, title: Option<&str>, text: &str) -> String {
    format!(
        "Source: {source}\nTitle: {title}\nText: {text}",
        title = title.unwrap_or("Untitled"),
        text = text.trim(),
    )
}

pub fn canonical_input_for(chunk: &Chunk) -> String {
    canonical_input(&chunk.source, chunk.title.as_deref(), &chunk.text)
}

/// SHA-256 of the canonical input, lowercase hex.
pub fn content_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run-scoped set of known content hashes.
#[derive(Debug, Default)]
pub struct HashRegistry {
    seen: HashSet<String>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from already-persisted embedding records.
    pub fn from_records(records: &[EmbeddingRecord]) -> Self {
        Self {
            seen: records.iter().map(|r| r.content_hash.clone()).collect(),
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    /// Returns `true` if the hash was not already registered.
    pub fn insert(&mut self, hash: &str) -> bool {
        self.seen.insert(hash.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
