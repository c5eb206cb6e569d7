//! Text extraction for HTML and PDF sources.
//!
//! HTML extraction walks the parsed document, drops site chrome
//! (`header`/`nav`/`footer`) and non-content subtrees (`script`, `style`,
//! `noscript`, `template`, `svg`), and collects the outermost text blocks
//! (`p`, `h1`-`h6`, `li`, `blockquote`, `pre`, `td`) joined by blank lines,
//! so paragraph boundaries survive into the chunker. The `<title>` element
//! and the outbound `a[href]` targets of the content area are captured
//! alongside the text.
//!
//! PDF extraction returns the document's plain text; malformed files produce
//! a [`PipelineError::Parse`] and the document is skipped by the pipeline.

use scraper::{ElementRef, Html, Selector};

use crate::error::PipelineError;

const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "header", "nav", "footer",
];

const BLOCK_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "blockquote",
    "pre",
    "td",
];

/// Result of extracting one HTML document.
#[derive(Debug, Clone)]
pub struct ExtractedHtml {
    pub title: Option<String>,
    /// Content text, paragraphs separated by blank lines.
    pub text: String,
    /// Raw `href` values found in the content area, document order.
    pub links: Vec<String>,
}

/// HTML extractor with pre-compiled selectors. Construct once per run.
pub struct HtmlExtractor {
    title: Selector,
    body: Selector,
    anchors: Selector,
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("title selector"),
            body: Selector::parse("body").expect("body selector"),
            anchors: Selector::parse("a[href]").expect("anchor selector"),
        }
    }

    pub fn extract(&self, html: &str) -> ExtractedHtml {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut blocks: Vec<String> = Vec::new();
        for element in root.descendent_elements() {
            if !BLOCK_TAGS.contains(&element.value().name()) {
                continue;
            }
            if has_ancestor_in(&element, SKIP_TAGS) || has_ancestor_in(&element, BLOCK_TAGS) {
                continue;
            }
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                blocks.push(text);
            }
        }

        // Documents without block markup still yield their body text as a
        // single paragraph.
        let text = if blocks.is_empty() {
            collect_loose_text(&root)
        } else {
            blocks.join("\n\n")
        };

        let mut links = Vec::new();
        for anchor in root.select(&self.anchors) {
            if has_ancestor_in(&anchor, SKIP_TAGS) {
                continue;
            }
            if let Some(href) = anchor.value().attr("href") {
                let href = href.trim();
                if !href.is_empty() {
                    links.push(href.to_string());
                }
            }
        }

        ExtractedHtml { title, text, links }
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract plain text from PDF bytes.
pub fn extract_pdf(bytes: &[u8], source: &str) -> Result<String, PipelineError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| PipelineError::Parse {
        document: source.to_string(),
        reason: e.to_string(),
    })?;
    Ok(normalize_paragraphs(&text))
}

/// Whole-body fallback when a document has no block-level markup: every text
/// node outside the skipped subtrees, collapsed into one paragraph.
fn collect_loose_text(root: &ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in root.descendants() {
        if let Some(text) = node.value().as_text() {
            let in_skipped = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| SKIP_TAGS.contains(&e.name()))
                    .unwrap_or(false)
            });
            if !in_skipped {
                raw.push_str(text);
                raw.push(' ');
            }
        }
    }
    collapse_whitespace(&raw)
}

fn has_ancestor_in(element: &ElementRef<'_>, tags: &[&str]) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .map(|e| tags.contains(&e.name()))
            .unwrap_or(false)
    })
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = true;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space {
                buf.push(' ');
                last_space = true;
            }
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    while buf.ends_with(' ') {
        buf.pop();
    }
    buf
}

/// Normalize raw text into blank-line-separated paragraphs with collapsed
/// inner whitespace.
pub fn normalize_paragraphs(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(collapse_whitespace(&current));
                current.clear();
            }
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(collapse_whitespace(&current));
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_paragraphs() {
        let html = r#"<html><head><title> About  Me </title></head>
            <body><p>First paragraph.</p><p>Second   paragraph.</p></body></html>"#;
        let out = HtmlExtractor::new().extract(html);
        assert_eq!(out.title.as_deref(), Some("About Me"));
        assert_eq!(out.text, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn skips_chrome_and_scripts() {
        let html = r#"<html><body>
            <header><p>Site header</p></header>
            <nav><ul><li>Home</li><li>Contact</li></ul></nav>
            <p>Real content here.</p>
            <script>var x = 1;</script>
            <footer><p>Copyright</p></footer>
            </body></html>"#;
        let out = HtmlExtractor::new().extract(html);
        assert_eq!(out.text, "Real content here.");
    }

    #[test]
    fn nested_blocks_count_once() {
        let html = "<body><ul><li>Outer <p>inner text</p></li></ul></body>";
        let out = HtmlExtractor::new().extract(html);
        assert_eq!(out.text, "Outer inner text");
    }

    #[test]
    fn collects_content_links_only() {
        let html = r#"<body>
            <nav><a href="/home">Home</a></nav>
            <p>See <a href="research.html">my research</a> and
               <a href="https://example.org/paper.pdf">this paper</a>.</p>
            </body>"#;
        let out = HtmlExtractor::new().extract(html);
        assert_eq!(
            out.links,
            vec!["research.html", "https://example.org/paper.pdf"]
        );
    }

    #[test]
    fn bare_text_body_is_one_paragraph() {
        let html = "<body>Loose text without markup</body>";
        let out = HtmlExtractor::new().extract(html);
        assert_eq!(out.text, "Loose text without markup");
    }

    #[test]
    fn invalid_pdf_is_parse_error() {
        let err = extract_pdf(b"not a pdf", "bad.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn normalize_paragraphs_collapses_and_splits() {
        let text = "line one\nline  two\n\n\nsecond   para\n";
        assert_eq!(
            normalize_paragraphs(text),
            "line one line two\n\nsecond para"
        );
    }
}
