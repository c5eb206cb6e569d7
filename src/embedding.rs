//! Embedding provider abstraction and the embedding pipeline stage.
//!
//! [`EmbeddingClient`] is the seam between the pipeline and the external
//! provider: the batch stage and the query-time retriever both take a client
//! handle, so tests substitute a deterministic implementation. The concrete
//! [`OpenAiClient`] calls an OpenAI-compatible `POST {base_url}/embeddings`
//! endpoint through the shared [`RetryPolicy`]:
//!
//! - HTTP 429 and 5xx → transient, retried with backoff and jitter
//! - other 4xx → permanent, fail immediately
//! - network errors → transient, retried
//!
//! Returned vectors are validated (non-empty, expected dimension) before
//! acceptance; a bad vector skips the fragment, never the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::dedup::{canonical_input_for, content_hash, HashRegistry};
use crate::error::PipelineError;
use crate::models::{Chunk, EmbeddingRecord};
use crate::retry::{Attempt, RetryPolicy};

/// Interface every embedding backend implements. Held by handle
/// (`Arc<dyn EmbeddingClient>`) and shared between the batch stage and the
/// retriever so both embed into the same vector space.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality, constant for the life of the store.
    fn dims(&self) -> usize;
    /// Embed one text. Implementations retry transient failures internally.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// Embedding client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Build a client from configuration. Requires `embedding.model` and
    /// `embedding.dims`, plus `OPENAI_API_KEY` in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            dims,
            retry: RetryPolicy::new(
                config.max_retries.max(1),
                Duration::from_secs(1),
                Duration::from_secs(32),
            ),
        })
    }

    async fn attempt_embed(&self, text: &str) -> Attempt<Vec<f32>, PipelineError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return Attempt::Transient(PipelineError::Provider(e.to_string())),
        };

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let detail = response.text().await.unwrap_or_default();
            return Attempt::Transient(PipelineError::Provider(format!(
                "provider returned {status}: {detail}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Attempt::Permanent(PipelineError::Provider(format!(
                "provider returned {status}: {detail}"
            )));
        }

        match response.json::<EmbeddingResponse>().await {
            Ok(parsed) => match parsed.data.into_iter().next() {
                Some(datum) => Attempt::Ok(datum.embedding),
                None => Attempt::Permanent(PipelineError::Provider(
                    "response contained no embedding data".to_string(),
                )),
            },
            Err(e) => Attempt::Permanent(PipelineError::Provider(format!(
                "malformed embedding response: {e}"
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let vector = self.retry.run(|| self.attempt_embed(text)).await?;
        validate_vector(&vector, self.dims, "query")?;
        Ok(vector)
    }
}

/// Create a client from configuration. Unlike the batch stages, query-time
/// callers hold the result as `Arc<dyn EmbeddingClient>`.
pub fn create_client(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiClient::new(config)?)),
        "disabled" => anyhow::bail!(
            "Embedding provider is disabled. Set [embedding] provider in config."
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Reject empty or wrong-dimension vectors before they reach the index.
pub fn validate_vector(
    vector: &[f32],
    expected_dims: usize,
    chunk_id: &str,
) -> Result<(), PipelineError> {
    if vector.is_empty() {
        return Err(PipelineError::InvalidEmbedding {
            chunk_id: chunk_id.to_string(),
            reason: "empty vector".to_string(),
        });
    }
    if vector.len() != expected_dims {
        return Err(PipelineError::InvalidEmbedding {
            chunk_id: chunk_id.to_string(),
            reason: format!("expected {expected_dims} dims, got {}", vector.len()),
        });
    }
    Ok(())
}

/// Counters reported by one embedding run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedReport {
    pub embedded: usize,
    pub duplicates: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Embed every non-duplicate, non-empty chunk. Per-fragment failures are
/// logged and counted, never fatal. The registry is updated before each
/// provider call, so identical content later in the same run is skipped as
/// a duplicate; a failed fragment is retried on the next run because only
/// persisted records seed the registry then.
pub async fn embed_chunks(
    client: &dyn EmbeddingClient,
    chunks: &[Chunk],
    registry: &mut HashRegistry,
) -> (Vec<EmbeddingRecord>, EmbedReport) {
    let mut records = Vec::new();
    let mut report = EmbedReport::default();

    for chunk in chunks {
        if chunk.text.trim().is_empty() {
            tracing::warn!(chunk_id = %chunk.id, "skipping empty chunk");
            report.empty += 1;
            continue;
        }

        let canonical = canonical_input_for(chunk);
        let hash = content_hash(&canonical);
        if !registry.insert(&hash) {
            tracing::debug!(chunk_id = %chunk.id, "skipping duplicate chunk");
            report.duplicates += 1;
            continue;
        }

        match client.embed(&canonical).await {
            Ok(vector) => {
                if let Err(e) = validate_vector(&vector, client.dims(), &chunk.id) {
                    tracing::warn!(chunk_id = %chunk.id, error = %e, "invalid embedding, skipping");
                    report.failed += 1;
                    continue;
                }
                records.push(EmbeddingRecord {
                    chunk_id: chunk.id.clone(),
                    source: chunk.source.clone(),
                    title: chunk.title.clone(),
                    text: chunk.text.clone(),
                    token_count: chunk.token_count,
                    embedding: vector,
                    content_hash: hash,
                });
                report.embedded += 1;
            }
            Err(e) => {
                tracing::warn!(chunk_id = %chunk.id, error = %e, "embedding failed, skipping");
                report.failed += 1;
            }
        }
    }

    (records, report)
}
