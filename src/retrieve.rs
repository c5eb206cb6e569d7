//! Query-time retrieval and context assembly.
//!
//! Per request: compose a token-budgeted query from the conversation
//! history, embed it with the same model that built the index, run exact
//! top-k search, map positions to metadata (defensively dropping any
//! position at or beyond the metadata bound), and assemble the grounding
//! context handed to the external generation collaborator.
//!
//! The [`Retriever`] holds the loaded store and the embedding client by
//! `Arc` handle — both are initialized once at process start and shared
//! read-only across concurrent requests. Picking up a rebuilt index means
//! constructing a new `Retriever`; nothing reloads at request time.

use std::sync::Arc;

use crate::embedding::EmbeddingClient;
use crate::error::PipelineError;
use crate::models::{ChatMessage, EmbeddingRecord, GenerationRequest, Role};
use crate::store::VectorStore;
use crate::tokens::TokenCounter;

/// Compose the retrieval query: the current message in full, preceded by as
/// many of the most recent prior user messages as the token budget allows,
/// in chronological order. A current message that alone exceeds the budget
/// is truncated to exactly the budget and returned alone — never an error.
pub fn build_rag_query(
    history: &[ChatMessage],
    current: &str,
    budget: usize,
    counter: &TokenCounter,
) -> String {
    let current_tokens = counter.count(current);
    if current_tokens > budget {
        return counter.truncate(current, budget);
    }

    let mut remaining = budget - current_tokens;
    let mut selected: Vec<&str> = Vec::new();

    for message in history.iter().rev() {
        if message.role != Role::User {
            continue;
        }
        let cost = counter.count(&message.content);
        if cost > remaining {
            break;
        }
        selected.insert(0, &message.content);
        remaining -= cost;
    }

    selected.push(current);
    selected.join(" ").trim().to_string()
}

/// One retrieval hit: a metadata record plus its distance.
#[derive(Debug, Clone)]
pub struct Retrieved<'a> {
    pub record: &'a EmbeddingRecord,
    pub distance: f32,
}

/// Read-only retrieval handle over the loaded store.
pub struct Retriever {
    store: Arc<VectorStore>,
    client: Arc<dyn EmbeddingClient>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever").finish_non_exhaustive()
    }
}

impl Retriever {
    /// The client must embed into the store's vector space; a dimension
    /// mismatch is refused up front rather than at the first query.
    pub fn new(
        store: Arc<VectorStore>,
        client: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, PipelineError> {
        if !store.is_empty() && client.dims() != store.index().dims() {
            return Err(PipelineError::DimensionMismatch {
                got: client.dims(),
                want: store.index().dims(),
            });
        }
        Ok(Self { store, client })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Embed the query and return the nearest records, nearest first.
    /// Positions beyond the metadata bound (a stale or mismatched index
    /// file) are discarded rather than trusted.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Retrieved<'_>>, PipelineError> {
        let query_vector = self.client.embed(query).await?;
        let hits = self.store.index().search(&query_vector, top_k)?;

        let records = self.store.records();
        let mut results = Vec::with_capacity(hits.len());
        for (position, distance) in hits {
            match records.get(position) {
                Some(record) => results.push(Retrieved { record, distance }),
                None => {
                    tracing::warn!(
                        position,
                        bound = records.len(),
                        "search position beyond metadata bound, discarding"
                    );
                }
            }
        }
        Ok(results)
    }
}

/// Concatenate retrieved chunks into the grounding context, in search
/// order (nearest first), each block tagged with its provenance.
pub fn assemble_context(results: &[Retrieved<'_>]) -> String {
    results
        .iter()
        .map(|r| format!("Source: {}\n{}", r.record.source, r.record.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the payload handed to the external generation collaborator:
/// assembled context, the last `history_window` messages, and the current
/// message. This core never calls the generation model.
pub fn build_generation_request(
    context: String,
    history: &[ChatMessage],
    message: &str,
    history_window: usize,
) -> GenerationRequest {
    let start = history.len().saturating_sub(history_window);
    GenerationRequest {
        context,
        history: history[start..].to_vec(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::index::FlatIndex;

    struct UnitClient {
        dims: usize,
        fixed: Option<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingClient for UnitClient {
        fn model_name(&self) -> &str {
            "unit-test-model"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            if let Some(v) = &self.fixed {
                return Ok(v.clone());
            }
            // Deterministic: first dim encodes text length.
            let mut v = vec![0.0; self.dims];
            v[0] = text.len() as f32;
            Ok(v)
        }
    }

    fn record(chunk_id: &str, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: chunk_id.to_string(),
            source: format!("{chunk_id}.html"),
            title: None,
            text: format!("text of {chunk_id}"),
            token_count: 3,
            embedding,
            content_hash: format!("hash-{chunk_id}"),
        }
    }

    fn store_of(vectors: Vec<Vec<f32>>) -> VectorStore {
        let mut index = FlatIndex::new(vectors[0].len());
        let mut records = Vec::new();
        for (i, v) in vectors.into_iter().enumerate() {
            index.push(&v).unwrap();
            records.push(record(&format!("c{i}"), v));
        }
        VectorStore::from_parts(index, records).unwrap()
    }

    fn words(n: usize, tag: &str) -> String {
        (0..n).map(|i| format!("{tag}{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn query_includes_recent_user_history_in_order() {
        let counter = TokenCounter::new().unwrap();
        let history = vec![
            ChatMessage::user("oldest question about projects"),
            ChatMessage::assistant("an answer that must be excluded"),
            ChatMessage::user("middle question about research"),
            ChatMessage::user("latest question about talks"),
        ];
        let query = build_rag_query(&history, "current message", 2500, &counter);

        assert!(query.ends_with("current message"));
        let oldest = query.find("oldest question").unwrap();
        let middle = query.find("middle question").unwrap();
        let latest = query.find("latest question").unwrap();
        assert!(oldest < middle && middle < latest);
        assert!(!query.contains("must be excluded"));
    }

    #[test]
    fn query_drops_oldest_excess_history() {
        let counter = TokenCounter::new().unwrap();
        // 20 prior user messages plus a current one; the budget fits only
        // some of the most recent.
        let history: Vec<ChatMessage> = (0..20)
            .map(|i| ChatMessage::user(words(100, &format!("m{i}w"))))
            .collect();
        let current = "the current message";
        let budget = 2500;
        let query = build_rag_query(&history, current, budget, &counter);

        assert!(counter.count(&query) <= budget);
        assert!(query.ends_with(current));
        // Most recent history survives, the oldest is dropped.
        assert!(query.contains("m19w0"));
        assert!(!query.contains("m0w0"));
        // Whatever made it in is in chronological order.
        if let (Some(a), Some(b)) = (query.find("m18w0"), query.find("m19w0")) {
            assert!(a < b);
        }
    }

    #[test]
    fn oversized_current_message_is_truncated_not_an_error() {
        let counter = TokenCounter::new().unwrap();
        let current = words(4000, "w");
        let budget = 100;
        let history = vec![ChatMessage::user("prior message")];
        let query = build_rag_query(&history, &current, budget, &counter);

        assert!(counter.count(&query) <= budget);
        assert!(!query.is_empty());
        assert!(!query.contains("prior message"));
    }

    #[tokio::test]
    async fn self_query_returns_own_metadata_first() {
        // Ten records; a query embedding equal to vector 3 must return
        // record 3 as the nearest hit, at distance zero.
        let dims = 4;
        let vectors: Vec<Vec<f32>> = (0..10)
            .map(|i| {
                let mut v = vec![0.0; dims];
                v[i % dims] = (i + 1) as f32;
                v
            })
            .collect();
        let store = Arc::new(store_of(vectors.clone()));
        let client = Arc::new(UnitClient {
            dims,
            fixed: Some(vectors[3].clone()),
        });
        let retriever = Retriever::new(store, client).unwrap();

        let results = retriever.retrieve("whatever", 5).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].record.chunk_id, "c3");
        assert_eq!(results[0].distance, 0.0);
    }

    #[tokio::test]
    async fn retrieve_maps_all_in_bound_positions() {
        let store = store_of(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let client = Arc::new(UnitClient {
            dims: 2,
            fixed: None,
        });
        let retriever = Retriever::new(Arc::new(store), client).unwrap();

        let results = retriever.retrieve("hi", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn retriever_refuses_mismatched_dimensions() {
        let store = Arc::new(store_of(vec![vec![1.0, 0.0, 0.0]]));
        let client = Arc::new(UnitClient {
            dims: 2,
            fixed: None,
        });
        let err = Retriever::new(store, client).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }

    #[test]
    fn context_is_provenance_tagged_and_ordered() {
        let r0 = record("c0", vec![1.0]);
        let r1 = record("c1", vec![2.0]);
        let results = vec![
            Retrieved {
                record: &r0,
                distance: 0.0,
            },
            Retrieved {
                record: &r1,
                distance: 1.0,
            },
        ];
        let context = assemble_context(&results);
        assert_eq!(
            context,
            "Source: c0.html\ntext of c0\n\nSource: c1.html\ntext of c1"
        );
    }

    #[test]
    fn generation_request_bounds_history_window() {
        let history: Vec<ChatMessage> = (0..30)
            .map(|i| ChatMessage::user(format!("message {i}")))
            .collect();
        let request =
            build_generation_request("ctx".to_string(), &history, "now", 12);
        assert_eq!(request.history.len(), 12);
        assert_eq!(request.history[0].content, "message 18");
        assert_eq!(request.history[11].content, "message 29");
        assert_eq!(request.message, "now");
        assert_eq!(request.context, "ctx");
    }
}
