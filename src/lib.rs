//! # Knowledge Harness
//!
//! A retrieval-augmented knowledge pipeline for grounding an assistant's
//! answers in a document corpus.
//!
//! Knowledge Harness ingests heterogeneous documents (local HTML, local
//! PDF, first-level linked pages), splits them into provenance-tagged
//! chunks, embeds new content through a deduplicating, retrying pipeline,
//! and maintains an exact nearest-neighbor index paired with a metadata
//! sidecar. At query time it composes a token-budgeted query from the
//! conversation, retrieves the nearest chunks, and assembles the grounding
//! context handed to an external generation service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │   Sources    │──▶│   Pipeline     │──▶│  Flat stores    │
//! │ HTML/PDF/URL │   │ Chunk+Dedup   │   │ chunks.json     │
//! └──────────────┘   │  +Embed       │   │ index.bin       │
//!                    └───────────────┘   │ metadata.bin    │
//!                                        └───────┬────────┘
//!                                                │
//!                               ┌────────────────┤
//!                               ▼                ▼
//!                          ┌─────────┐     ┌───────────┐
//!                          │   CLI   │     │ Retriever  │
//!                          │  (kh)   │     │ (per req)  │
//!                          └─────────┘     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kh extract                  # chunk the configured sources
//! kh embed                    # embed new chunks, build/extend the index
//! kh query "what is openstef?"
//! kh stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | HTML and PDF text extraction |
//! | [`links`] | First-level link resolution and fetching |
//! | [`chunker`] | Sentence-aware text chunking |
//! | [`tokens`] | Token counting and truncation |
//! | [`dedup`] | Content-hash deduplication |
//! | [`retry`] | Reusable retry/backoff policy |
//! | [`embedding`] | Embedding provider abstraction and stage |
//! | [`index`] | Flat exact nearest-neighbor index |
//! | [`store`] | Persisted chunk store and index/metadata pair |
//! | [`retrieve`] | Query building, retrieval, context assembly |
//! | [`gate`] | Admit/deny gate at the request boundary |
//! | [`pipeline`] | Batch orchestration |

pub mod chunker;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gate;
pub mod index;
pub mod links;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod retry;
pub mod store;
pub mod tokens;
