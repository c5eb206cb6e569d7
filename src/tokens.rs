//! Token counting and truncation over the generation model's tokenizer.
//!
//! The query builder and the chunker both measure text with the same
//! `cl100k_base` encoding the downstream generation model uses, so the query
//! token budget lines up with what the generation call will actually see.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::PipelineError;

/// Shared tokenizer handle. Construct once and pass by reference; the
/// underlying encoder is immutable and thread-safe.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn new() -> Result<Self, PipelineError> {
        let bpe = cl100k_base()
            .map_err(|e| PipelineError::Provider(format!("tokenizer init failed: {e}")))?;
        Ok(Self { bpe })
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Truncate `text` to at most `budget` tokens. Never fails: if decoding
    /// a prefix lands inside a multi-byte sequence, the prefix is shrunk
    /// token by token until it decodes cleanly.
    pub fn truncate(&self, text: &str, budget: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= budget {
            return text.to_string();
        }

        let mut end = budget;
        while end > 0 {
            if let Ok(decoded) = self.bpe.decode(tokens[..end].to_vec()) {
                return decoded.trim().to_string();
            }
            end -= 1;
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_positive_for_text() {
        let counter = TokenCounter::new().unwrap();
        assert!(counter.count("hello world") > 0);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn truncate_within_budget_is_identity() {
        let counter = TokenCounter::new().unwrap();
        let text = "a short sentence";
        assert_eq!(counter.truncate(text, 100), text);
    }

    #[test]
    fn truncate_respects_budget_exactly() {
        let counter = TokenCounter::new().unwrap();
        let text = "one two three four five six seven eight nine ten ".repeat(50);
        let truncated = counter.truncate(&text, 25);
        assert!(counter.count(&truncated) <= 25);
        assert!(!truncated.is_empty());
    }

    #[test]
    fn truncate_to_zero_budget_is_empty() {
        let counter = TokenCounter::new().unwrap();
        assert_eq!(counter.truncate("anything at all", 0), "");
    }
}
