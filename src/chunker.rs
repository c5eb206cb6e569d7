//! Paragraph-and-sentence text chunker.
//!
//! Splits document text on blank-line paragraph boundaries, sentence-splits
//! each paragraph, and greedily packs whole sentences into word-bounded
//! chunks. A chunk never splits inside a sentence and never spans a
//! paragraph boundary.
//!
//! # Guarantees
//!
//! - Every chunk's word count is ≤ `chunk_size`, except the final chunk of
//!   a paragraph (which may absorb a short tail, or hold a single sentence
//!   longer than the limit).
//! - Chunks below `min_words` are discarded as boilerplate; a short
//!   paragraph tail is merged into the paragraph's previous chunk instead
//!   of being dropped.
//! - With `overlap_sentences > 0`, the last sentences of an emitted chunk
//!   are carried into the next chunk of the same paragraph. Carried
//!   sentences do not count toward the minimum-word filter.
//! - Chunk indices are contiguous per document: `0, 1, 2, …, N-1`.

use regex::Regex;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, SourceDocument};
use crate::tokens::TokenCounter;

pub struct Chunker {
    chunk_size: usize,
    min_words: usize,
    overlap_sentences: usize,
    sentence_re: Regex,
}

/// In-progress chunk: sentences plus word counts, split into carried
/// (overlap) and fresh parts.
#[derive(Default)]
struct Packed {
    sentences: Vec<String>,
    words: usize,
    fresh_words: usize,
}

impl Packed {
    fn push(&mut self, sentence: &str, words: usize, fresh: bool) {
        self.sentences.push(sentence.to_string());
        self.words += words;
        if fresh {
            self.fresh_words += words;
        }
    }

    fn text(&self) -> String {
        self.sentences.join(" ")
    }

    fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            min_words: config.min_words,
            overlap_sentences: config.overlap_sentences,
            sentence_re: Regex::new(r#"[^.!?]+[.!?]+["')\]]*|[^.!?]+"#)
                .expect("sentence pattern"),
        }
    }

    /// Split a paragraph into sentences. Terminators stay attached; text
    /// without terminal punctuation comes back as a single sentence.
    pub fn split_sentences(&self, paragraph: &str) -> Vec<String> {
        self.sentence_re
            .find_iter(paragraph)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Chunk a document's body. Provenance (source location and title) is
    /// stamped onto every chunk; token counts use the shared tokenizer.
    pub fn chunk_document(&self, doc: &SourceDocument, counter: &TokenCounter) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();

        for paragraph in doc.body.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            for packed in self.pack_paragraph(paragraph) {
                let text = packed.text();
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    chunk_index: chunks.len(),
                    source: doc.location.clone(),
                    title: doc.title.clone(),
                    text: text.clone(),
                    token_count: counter.count(&text),
                });
            }
        }

        chunks
    }

    /// Greedily pack one paragraph's sentences into chunks.
    fn pack_paragraph(&self, paragraph: &str) -> Vec<Packed> {
        let sentences = self.split_sentences(paragraph);
        let mut emitted: Vec<Packed> = Vec::new();
        let mut current = Packed::default();

        for sentence in &sentences {
            let words = word_count(sentence);

            if words > self.chunk_size {
                // A sentence longer than the limit stands alone rather than
                // being split mid-sentence.
                if !current.is_empty() {
                    emitted.push(std::mem::take(&mut current));
                }
                let mut oversized = Packed::default();
                oversized.push(sentence, words, true);
                emitted.push(oversized);
                continue;
            }

            if current.words + words > self.chunk_size && !current.is_empty() {
                let carry = self.carry_from(&current);
                emitted.push(std::mem::take(&mut current));
                for (s, w) in &carry {
                    current.push(s, *w, false);
                }
                // A carry that leaves no room for the next sentence is
                // dropped so every flush consumes fresh input.
                if current.words + words > self.chunk_size {
                    current = Packed::default();
                }
            }

            current.push(sentence, words, true);
        }

        if !current.is_empty() {
            emitted.push(current);
        }

        // Merge a short tail into the previous chunk of the same paragraph;
        // the result is the final chunk, which alone may exceed the limit.
        if emitted.len() >= 2 {
            let tail_fresh = emitted[emitted.len() - 1].fresh_words;
            if tail_fresh < self.min_words {
                let tail = emitted.pop().map(|p| p.text());
                if let (Some(tail), Some(prev)) = (tail, emitted.last_mut()) {
                    let words = word_count(&tail);
                    prev.push(&tail, words, true);
                }
            }
        }

        emitted.retain(|p| p.fresh_words >= self.min_words);
        emitted
    }

    fn carry_from(&self, packed: &Packed) -> Vec<(String, usize)> {
        if self.overlap_sentences == 0 {
            return Vec::new();
        }
        let start = packed.sentences.len().saturating_sub(self.overlap_sentences);
        packed.sentences[start..]
            .iter()
            .map(|s| (s.clone(), word_count(s)))
            .collect()
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
