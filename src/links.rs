//! First-level outbound link resolution and fetching.
//!
//! Links discovered in an HTML document's content area are resolved into
//! local `.html` paths (relative to the document) or absolute `http(s)`
//! URLs, fetched at most once per run through a shared [`LinkSet`], and
//! their extracted text appended to the primary document. Crawl depth is
//! fixed at one: linked pages are extracted but their own links are ignored.
//! Every per-link failure is logged and skipped; the primary document is
//! never aborted by its links.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::PipelineError;
use crate::extract::HtmlExtractor;

/// A resolved link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    LocalHtml(PathBuf),
    External(Url),
}

impl LinkTarget {
    /// Canonical key used for seen-set memoization.
    pub fn key(&self) -> String {
        match self {
            LinkTarget::LocalHtml(path) => path.to_string_lossy().to_string(),
            LinkTarget::External(url) => url.as_str().to_string(),
        }
    }
}

/// Per-run set of already-fetched link keys. Prevents repeat fetches and,
/// together with the fixed depth, any recursion.
#[derive(Debug, Default)]
pub struct LinkSet {
    seen: HashSet<String>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a key is inserted.
    pub fn insert(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Resolve raw `href` values against the document's directory. Fragments,
/// mail links, and relative targets that are not `.html` files are dropped.
pub fn resolve_links(raw_links: &[String], base_dir: &Path) -> Vec<LinkTarget> {
    let mut targets = Vec::new();
    for href in raw_links {
        if href.starts_with('#') || href.starts_with("mailto:") {
            continue;
        }
        if href.starts_with("http://") || href.starts_with("https://") {
            match Url::parse(href) {
                Ok(url) => targets.push(LinkTarget::External(url)),
                Err(e) => tracing::warn!(href = %href, error = %e, "unparseable external link"),
            }
        } else if href.ends_with(".html") {
            let path = base_dir.join(href);
            // Canonicalize so `a/../b.html` and `b.html` share one seen key.
            match path.canonicalize() {
                Ok(canonical) => targets.push(LinkTarget::LocalHtml(canonical)),
                Err(_) => tracing::warn!(href = %href, "linked file does not exist, skipping"),
            }
        }
    }
    targets
}

/// Report for one document's link crawl.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrawlReport {
    pub followed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fetch each unseen target once and return the concatenation of their
/// extracted texts (blank-line separated), plus a crawl report.
pub async fn fetch_linked_text(
    targets: &[LinkTarget],
    seen: &mut LinkSet,
    http: &reqwest::Client,
    extractor: &HtmlExtractor,
) -> (String, CrawlReport) {
    let mut report = CrawlReport::default();
    let mut collected: Vec<String> = Vec::new();

    for target in targets {
        if !seen.insert(&target.key()) {
            report.skipped += 1;
            continue;
        }

        match fetch_target(target, http, extractor).await {
            Ok(text) => {
                if !text.is_empty() {
                    collected.push(text);
                }
                report.followed += 1;
            }
            Err(e) => {
                tracing::warn!(target = %target.key(), error = %e, "link fetch failed, skipping");
                report.failed += 1;
            }
        }
    }

    (collected.join("\n\n"), report)
}

async fn fetch_target(
    target: &LinkTarget,
    http: &reqwest::Client,
    extractor: &HtmlExtractor,
) -> Result<String, PipelineError> {
    match target {
        LinkTarget::LocalHtml(path) => {
            let html = std::fs::read_to_string(path).map_err(|e| PipelineError::Fetch {
                target: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(extractor.extract(&html).text)
        }
        LinkTarget::External(url) => {
            let response = http
                .get(url.clone())
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::Fetch {
                    target: url.to_string(),
                    reason: e.to_string(),
                })?;
            let body = response.text().await.map_err(|e| PipelineError::Fetch {
                target: url.to_string(),
                reason: e.to_string(),
            })?;
            Ok(extractor.extract(&body).text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_external_and_drops_noise() {
        let raw = vec![
            "https://example.org/page".to_string(),
            "#section".to_string(),
            "mailto:someone@example.org".to_string(),
            "styles.css".to_string(),
        ];
        let targets = resolve_links(&raw, Path::new("/tmp"));
        assert_eq!(targets.len(), 1);
        assert!(matches!(targets[0], LinkTarget::External(_)));
    }

    #[test]
    fn resolves_local_html_relative_to_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("about.html"), "<p>hi</p>").unwrap();
        let raw = vec!["about.html".to_string(), "missing.html".to_string()];
        let targets = resolve_links(&raw, dir.path());
        assert_eq!(targets.len(), 1);
        match &targets[0] {
            LinkTarget::LocalHtml(p) => assert!(p.ends_with("about.html")),
            other => panic!("expected local target, got {:?}", other),
        }
    }

    #[test]
    fn link_set_deduplicates() {
        let mut seen = LinkSet::new();
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.contains("a"));
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn local_fetch_is_memoized_and_failures_isolated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("linked.html"),
            "<body><p>Linked page content.</p></body>",
        )
        .unwrap();

        let raw = vec!["linked.html".to_string(), "linked.html".to_string()];
        let targets = resolve_links(&raw, dir.path());
        assert_eq!(targets.len(), 2);

        let mut seen = LinkSet::new();
        let http = reqwest::Client::new();
        let extractor = HtmlExtractor::new();
        let (text, report) = fetch_linked_text(&targets, &mut seen, &http, &extractor).await;

        assert_eq!(text, "Linked page content.");
        assert_eq!(report.followed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }
}
