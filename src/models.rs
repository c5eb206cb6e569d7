//! Core data models used throughout the knowledge pipeline.
//!
//! These types represent the documents, chunks, and embedding records that
//! flow through ingestion and retrieval, plus the conversation types consumed
//! at query time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a source document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    LocalHtml,
    LocalPdf,
    ExternalUrl,
}

/// A document after extraction, ready for chunking. Read-only input; the
/// pipeline never mutates it.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub kind: SourceKind,
    /// File path (relative to its source directory) or URL.
    pub location: String,
    pub title: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Extracted text, paragraphs separated by blank lines.
    pub body: String,
}

/// A bounded, provenance-tagged span of source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: usize,
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    pub token_count: usize,
}

/// A chunk paired with its embedding vector and canonical content hash.
/// At most one record exists per unique `content_hash` across the lifetime
/// of the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub source: String,
    pub title: Option<String>,
    pub text: String,
    pub token_count: usize,
    pub embedding: Vec<f32>,
    pub content_hash: String,
}

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message of the (ephemeral) conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Payload handed to the external answer-generation collaborator. This core
/// prepares the prompt inputs but never calls the generation model itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Retrieved chunks assembled into a grounding context, nearest first.
    pub context: String,
    /// Bounded recent-history window, oldest first.
    pub history: Vec<ChatMessage>,
    /// The current user message, verbatim.
    pub message: String,
}
