//! # Knowledge Harness CLI (`kh`)
//!
//! The `kh` binary drives the retrieval-augmented knowledge pipeline:
//! document extraction and chunking, embedding generation, index
//! construction, and one-shot grounded retrieval.
//!
//! ## Usage
//!
//! ```bash
//! kh --config ./config/kh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kh extract` | Scan HTML/PDF sources (and first-level links) into the chunk store |
//! | `kh embed` | Embed new chunks and build or extend the vector index |
//! | `kh query "<message>"` | Retrieve grounding context and print the generation payload |
//! | `kh stats` | Show chunk store and vector store sizes |
//!
//! ## Examples
//!
//! ```bash
//! # Chunk the site's documents
//! kh extract --config ./config/kh.toml
//!
//! # Embed anything new (idempotent; a second run writes nothing)
//! kh embed --config ./config/kh.toml
//!
//! # Ask a grounded question with prior history
//! kh query "what did Majid publish in 2021?" --history ./history.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use knowledge_harness::config;
use knowledge_harness::embedding;
use knowledge_harness::gate::{AdmitGate, FixedWindowGate, GateChain};
use knowledge_harness::models::ChatMessage;
use knowledge_harness::pipeline;

/// Knowledge Harness CLI — a retrieval-augmented knowledge pipeline for
/// grounding an assistant's answers in a document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kh",
    about = "Knowledge Harness — ingest documents, embed them, and serve grounded retrieval",
    version,
    long_about = "Knowledge Harness ingests heterogeneous documents (local HTML, local PDF, \
    first-level linked pages), chunks and embeds them into an exact nearest-neighbor index, \
    and serves top-k retrieval plus context assembly for a downstream generation call."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Extract and chunk the configured document sources.
    ///
    /// Scans the HTML and PDF directories plus any configured external
    /// URLs, follows first-level outbound links once each, chunks the
    /// extracted text, and writes the chunk store. Per-document failures
    /// are logged and skipped.
    Extract {
        /// Skip the HTML source directory.
        #[arg(long)]
        skip_html: bool,

        /// Skip the PDF source directory.
        #[arg(long)]
        skip_pdf: bool,
    },

    /// Generate embeddings and build or extend the vector index.
    ///
    /// Loads the chunk store, skips content already embedded (by canonical
    /// content hash), embeds the rest with retry/backoff, and appends to
    /// the persisted index and metadata pair. Idempotent: re-running over
    /// an unchanged corpus creates zero new embeddings.
    Embed {
        /// Ignore the existing index and re-embed everything from scratch.
        #[arg(long)]
        rebuild: bool,

        /// Show how many chunks would be embedded without calling the provider.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve grounding context for a message and print the generation payload.
    ///
    /// Composes a token-budgeted query from the message (and optional
    /// history file), embeds it, runs exact top-k search, and prints the
    /// assembled context plus recent-history window as JSON — the exact
    /// payload handed to the external generation service.
    Query {
        /// The user message to ground.
        message: String,

        /// Path to a JSON file with prior history: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Override the configured number of results.
        #[arg(long)]
        top_k: Option<usize>,

        /// Skip the admit gate (the gate is per-process; a one-shot CLI
        /// invocation normally starts with a fresh window anyway).
        #[arg(long)]
        no_gate: bool,
    },

    /// Show chunk store and vector store statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Extract {
            skip_html,
            skip_pdf,
        } => {
            pipeline::run_extract(&config, skip_html, skip_pdf).await?;
        }
        Commands::Embed { rebuild, dry_run } => {
            let client = embedding::create_client(&config.embedding)?;
            pipeline::run_embed(&config, client.as_ref(), rebuild, dry_run).await?;
        }
        Commands::Query {
            message,
            history,
            top_k,
            no_gate,
        } => {
            if let Some(k) = top_k {
                config.retrieval.top_k = k;
            }

            let history: Vec<ChatMessage> = match history {
                Some(path) => {
                    let data = std::fs::read_to_string(&path)?;
                    serde_json::from_str(&data)?
                }
                None => Vec::new(),
            };

            let client: Arc<dyn embedding::EmbeddingClient> =
                Arc::from(embedding::create_client(&config.embedding)?);

            let gate = GateChain::new(vec![Box::new(FixedWindowGate::from_config(&config.gate))]);
            let gate_ref: Option<&dyn AdmitGate> = if no_gate { None } else { Some(&gate) };

            let request = pipeline::run_query(
                &config,
                client,
                gate_ref,
                "local",
                &message,
                &history,
            )
            .await?;

            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Commands::Stats => {
            pipeline::run_stats(&config)?;
        }
    }

    Ok(())
}
