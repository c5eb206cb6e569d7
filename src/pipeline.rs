//! Batch pipeline orchestration.
//!
//! Coordinates the full flow: source scan → extraction (+ first-level
//! links) → chunking → chunk store, then chunk store → deduplication →
//! embedding → index/metadata pair. Stages run sequentially; per-document
//! and per-link failures are isolated and logged, structural store
//! failures abort.

use anyhow::{Context, Result};
use chrono::Utc;
use globset::Glob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunker::Chunker;
use crate::config::Config;
use crate::dedup::{canonical_input_for, content_hash, HashRegistry};
use crate::embedding::{embed_chunks, EmbedReport, EmbeddingClient};
use crate::extract::{extract_pdf, HtmlExtractor};
use crate::gate::{AdmitGate, Admission};
use crate::index::FlatIndex;
use crate::links::{fetch_linked_text, resolve_links, CrawlReport, LinkSet};
use crate::models::{ChatMessage, Chunk, GenerationRequest, SourceDocument, SourceKind};
use crate::retrieve::{
    assemble_context, build_generation_request, build_rag_query, Retriever,
};
use crate::store::{self, VectorStore};
use crate::tokens::TokenCounter;

/// Counters from one extraction run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractSummary {
    pub documents: usize,
    pub skipped_documents: usize,
    pub chunks: usize,
    pub links: CrawlReport,
}

/// Scan the configured sources, extract and chunk every document, and
/// write the chunk store.
pub async fn run_extract(config: &Config, skip_html: bool, skip_pdf: bool) -> Result<ExtractSummary> {
    let counter = TokenCounter::new().context("tokenizer init failed")?;
    let chunker = Chunker::new(&config.chunking);
    let extractor = HtmlExtractor::new();
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let mut seen_links = LinkSet::new();
    let mut summary = ExtractSummary::default();
    let mut chunks: Vec<Chunk> = Vec::new();

    if !skip_html {
        if let Some(html_dir) = &config.sources.html_dir {
            for path in scan_dir(html_dir, "**/*.html")? {
                match process_html_file(
                    &path,
                    html_dir,
                    config.sources.follow_links,
                    &extractor,
                    &mut seen_links,
                    &http,
                )
                .await
                {
                    Ok((doc, crawl)) => {
                        chunks.extend(chunker.chunk_document(&doc, &counter));
                        summary.documents += 1;
                        summary.links.followed += crawl.followed;
                        summary.links.skipped += crawl.skipped;
                        summary.links.failed += crawl.failed;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping HTML document");
                        summary.skipped_documents += 1;
                    }
                }
            }
        }
    }

    if !skip_pdf {
        if let Some(pdf_dir) = &config.sources.pdf_dir {
            for path in scan_dir(pdf_dir, "**/*.pdf")? {
                match process_pdf_file(&path, pdf_dir) {
                    Ok(doc) => {
                        chunks.extend(chunker.chunk_document(&doc, &counter));
                        summary.documents += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping PDF document");
                        summary.skipped_documents += 1;
                    }
                }
            }
        }
    }

    for url in &config.sources.external_urls {
        // Mark as seen so link crawling does not fetch the same URL again.
        seen_links.insert(url);
        match process_external_url(url, &extractor, &http).await {
            Ok(doc) => {
                chunks.extend(chunker.chunk_document(&doc, &counter));
                summary.documents += 1;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "skipping external URL");
                summary.skipped_documents += 1;
            }
        }
    }

    summary.chunks = chunks.len();
    let chunks_path = config.data.chunks_path();
    store::save_chunks(&chunks_path, &chunks)
        .with_context(|| format!("Failed to write chunk store: {}", chunks_path.display()))?;

    println!("extract");
    println!("  documents processed: {}", summary.documents);
    println!("  documents skipped: {}", summary.skipped_documents);
    println!(
        "  links followed: {} ({} memoized, {} failed)",
        summary.links.followed, summary.links.skipped, summary.links.failed
    );
    println!("  chunks written: {}", summary.chunks);
    println!("ok");

    Ok(summary)
}

async fn process_html_file(
    path: &Path,
    root: &Path,
    follow_links: bool,
    extractor: &HtmlExtractor,
    seen_links: &mut LinkSet,
    http: &reqwest::Client,
) -> Result<(SourceDocument, CrawlReport)> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let extracted = extractor.extract(&html);

    let mut body = extracted.text;
    let mut crawl = CrawlReport::default();

    if follow_links {
        let base_dir = path.parent().unwrap_or(root);
        let targets = resolve_links(&extracted.links, base_dir);
        let (linked_text, report) =
            fetch_linked_text(&targets, seen_links, http, extractor).await;
        if !linked_text.is_empty() {
            body.push_str("\n\n");
            body.push_str(&linked_text);
        }
        crawl = report;
    }

    let doc = SourceDocument {
        id: Uuid::new_v4().to_string(),
        kind: SourceKind::LocalHtml,
        location: relative_location(path, root),
        title: extracted.title,
        fetched_at: Utc::now(),
        body,
    };
    Ok((doc, crawl))
}

fn process_pdf_file(path: &Path, root: &Path) -> Result<SourceDocument> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let location = relative_location(path, root);
    let body = extract_pdf(&bytes, &location)?;

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string());

    Ok(SourceDocument {
        id: Uuid::new_v4().to_string(),
        kind: SourceKind::LocalPdf,
        location,
        title,
        fetched_at: Utc::now(),
        body,
    })
}

async fn process_external_url(
    url: &str,
    extractor: &HtmlExtractor,
    http: &reqwest::Client,
) -> Result<SourceDocument> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("fetch {url}"))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let is_pdf = content_type.contains("application/pdf") || url.ends_with(".pdf");

    let (title, body) = if is_pdf {
        let bytes = response.bytes().await.with_context(|| format!("read {url}"))?;
        (None, extract_pdf(&bytes, url)?)
    } else {
        let html = response.text().await.with_context(|| format!("read {url}"))?;
        let extracted = extractor.extract(&html);
        (extracted.title, extracted.text)
    };

    Ok(SourceDocument {
        id: Uuid::new_v4().to_string(),
        kind: SourceKind::ExternalUrl,
        location: url.to_string(),
        title,
        fetched_at: Utc::now(),
        body,
    })
}

/// Counters from one embedding run.
#[derive(Debug, Clone, Copy)]
pub struct EmbedSummary {
    pub loaded_chunks: usize,
    pub existing_records: usize,
    pub report: EmbedReport,
    pub total_records: usize,
}

/// Embed every new chunk and extend (or build) the persisted index and
/// metadata pair. Re-running against an unchanged corpus writes nothing
/// new.
pub async fn run_embed(
    config: &Config,
    client: &dyn EmbeddingClient,
    rebuild: bool,
    dry_run: bool,
) -> Result<EmbedSummary> {
    let chunks_path = config.data.chunks_path();
    let chunks = store::load_chunks(&chunks_path).with_context(|| {
        format!(
            "Failed to read chunk store {} — run `kh extract` first",
            chunks_path.display()
        )
    })?;

    let index_path = config.data.index_path();
    let metadata_path = config.data.metadata_path();

    let mut vector_store = if !rebuild && store::store_state(&index_path, &metadata_path)? {
        let loaded = VectorStore::load(&index_path, &metadata_path)?;
        if loaded.index().dims() != client.dims() {
            anyhow::bail!(
                "existing index has {} dims but provider {} produces {}; \
                 use --rebuild to start over",
                loaded.index().dims(),
                client.model_name(),
                client.dims()
            );
        }
        loaded
    } else {
        VectorStore::from_parts(FlatIndex::new(client.dims()), Vec::new())?
    };

    let existing_records = vector_store.len();

    if dry_run {
        let mut probe = HashRegistry::from_records(vector_store.records());
        let pending = chunks
            .iter()
            .filter(|c| !c.text.trim().is_empty())
            .filter(|c| probe.insert(&content_hash(&canonical_input_for(c))))
            .count();
        println!("embed (dry-run)");
        println!("  chunks loaded: {}", chunks.len());
        println!("  existing records: {existing_records}");
        println!("  chunks needing embeddings: {pending}");
        return Ok(EmbedSummary {
            loaded_chunks: chunks.len(),
            existing_records,
            report: EmbedReport::default(),
            total_records: existing_records,
        });
    }

    let mut registry = HashRegistry::from_records(vector_store.records());
    let (new_records, report) = embed_chunks(client, &chunks, &mut registry).await;

    vector_store.append(new_records)?;
    vector_store.save(&index_path, &metadata_path)?;

    let summary = EmbedSummary {
        loaded_chunks: chunks.len(),
        existing_records,
        report,
        total_records: vector_store.len(),
    };

    println!("embed");
    println!("  chunks loaded: {}", summary.loaded_chunks);
    println!("  existing records: {}", summary.existing_records);
    println!("  new embeddings: {}", report.embedded);
    println!("  duplicates skipped: {}", report.duplicates);
    println!("  empty skipped: {}", report.empty);
    println!("  failed: {}", report.failed);
    println!("  total vectors: {}", summary.total_records);
    println!("ok");

    Ok(summary)
}

/// Serve one retrieval request: gate check, token-budgeted query, exact
/// search, context assembly. Returns the payload for the external
/// generation collaborator.
pub async fn run_query(
    config: &Config,
    client: Arc<dyn EmbeddingClient>,
    gate: Option<&dyn AdmitGate>,
    gate_key: &str,
    message: &str,
    history: &[ChatMessage],
) -> Result<GenerationRequest> {
    if let Some(gate) = gate {
        if gate.admit(gate_key).await? == Admission::Deny {
            anyhow::bail!("request denied by admit gate for key {gate_key}");
        }
    }

    let vector_store = VectorStore::load(&config.data.index_path(), &config.data.metadata_path())
        .context("cannot serve retrieval")?;
    let counter = TokenCounter::new().context("tokenizer init failed")?;
    let retriever = Retriever::new(Arc::new(vector_store), client)?;

    let query = build_rag_query(
        history,
        message,
        config.retrieval.query_token_budget,
        &counter,
    );
    let results = retriever.retrieve(&query, config.retrieval.top_k).await?;
    let context = assemble_context(&results);

    Ok(build_generation_request(
        context,
        history,
        message,
        config.retrieval.history_window,
    ))
}

/// Print store statistics.
pub fn run_stats(config: &Config) -> Result<()> {
    println!("stats");

    let chunks_path = config.data.chunks_path();
    match store::load_chunks(&chunks_path) {
        Ok(chunks) => println!("  chunk store: {} chunks", chunks.len()),
        Err(_) => println!("  chunk store: not built"),
    }

    match VectorStore::load(&config.data.index_path(), &config.data.metadata_path()) {
        Ok(vs) => {
            println!(
                "  vector store: {} vectors × {} dims",
                vs.len(),
                vs.index().dims()
            );
        }
        Err(e) => println!("  vector store: unavailable ({e})"),
    }

    Ok(())
}

fn scan_dir(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        anyhow::bail!("source directory does not exist: {}", dir.display());
    }
    let glob = Glob::new(pattern)?.compile_matcher();

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if glob.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }

    // Sort for deterministic ordering
    paths.sort();
    Ok(paths)
}

fn relative_location(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
