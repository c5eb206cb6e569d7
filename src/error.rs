//! Pipeline error taxonomy.
//!
//! Per-item failures (`Fetch`, `Parse`, `Provider`, `InvalidEmbedding`) are
//! isolated by the batch stages: the item is skipped, a warning is logged,
//! and the run continues. Structural failures (`IndexCorruption`,
//! `UnpairedStore`) are fatal and abort the run. `RetrievalUnavailable` is
//! the fail-closed signal surfaced when the persisted index or metadata
//! cannot be loaded at query time.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A link or URL could not be fetched. The link is skipped; processing
    /// of the primary document continues.
    #[error("failed to fetch {target}: {reason}")]
    Fetch { target: String, reason: String },

    /// A document could not be parsed (malformed HTML or PDF). The document
    /// is skipped; the pipeline continues.
    #[error("failed to parse {document}: {reason}")]
    Parse { document: String, reason: String },

    /// The embedding provider failed after the retry budget was exhausted,
    /// or rejected the request permanently.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// The provider returned an empty or malformed vector.
    #[error("invalid embedding for chunk {chunk_id}: {reason}")]
    InvalidEmbedding { chunk_id: String, reason: String },

    /// A vector's dimension does not match the index dimension.
    #[error("vector dimension {got} does not match index dimension {want}")]
    DimensionMismatch { got: usize, want: usize },

    /// Vector count and metadata length disagree. Fatal: the indexing run
    /// must halt rather than silently repair.
    #[error("index corruption: {vectors} vectors but {records} metadata records")]
    IndexCorruption { vectors: usize, records: usize },

    /// Exactly one of the index/metadata pair is present on disk.
    #[error("index and metadata sidecar must be loaded together: {0}")]
    UnpairedStore(String),

    /// The persisted index or metadata could not be loaded at query time.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("store codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
