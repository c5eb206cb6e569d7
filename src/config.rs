use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sources: SourcesConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

/// Document inputs: local HTML and PDF directories plus an optional explicit
/// external URL list.
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default)]
    pub html_dir: Option<PathBuf>,
    #[serde(default)]
    pub pdf_dir: Option<PathBuf>,
    #[serde(default)]
    pub external_urls: Vec<String>,
    /// Follow first-level outbound links from HTML documents.
    #[serde(default = "default_follow_links")]
    pub follow_links: bool,
}

fn default_follow_links() -> bool {
    true
}

/// Directory holding the three persisted stores.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub dir: PathBuf,
}

impl DataConfig {
    pub fn chunks_path(&self) -> PathBuf {
        self.dir.join("chunks.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.bin")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join("metadata.bin")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum words per chunk. Whole sentences are packed greedily; only
    /// the final chunk of a paragraph may exceed this.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks below this word count are discarded as boilerplate.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    /// Sentences carried from the end of one chunk into the next (0 = off).
    #[serde(default)]
    pub overlap_sentences: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_words: default_min_words(),
            overlap_sentences: 0,
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_min_words() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Token budget for the composed RAG query, measured with the generation
    /// model's tokenizer.
    #[serde(default = "default_query_token_budget")]
    pub query_token_budget: usize,
    /// Number of recent history messages included in the generation payload.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            query_token_budget: default_query_token_budget(),
            history_window: default_history_window(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_query_token_budget() -> usize {
    2500
}
fn default_history_window() -> usize {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    /// Requests admitted per key per window.
    #[serde(default = "default_gate_limit")]
    pub limit: u32,
    #[serde(default = "default_gate_window_secs")]
    pub window_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            limit: default_gate_limit(),
            window_secs: default_gate_window_secs(),
        }
    }
}

fn default_gate_limit() -> u32 {
    4
}
fn default_gate_window_secs() -> u64 {
    86_400
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.chunking.min_words >= config.chunking.chunk_size {
        anyhow::bail!("chunking.min_words must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.query_token_budget == 0 {
        anyhow::bail!("retrieval.query_token_budget must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
