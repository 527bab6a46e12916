//! An encoded document: the token space every tree range refers to.

use std::sync::Arc;

use recap_core::TreeError;

use crate::tokenizer::{Token, Tokenizer};

/// Source text plus its tokens, encoded exactly once.
///
/// Building and querying a tree must go through the same `Document` (or one
/// built from the same text with the same tokenizer), otherwise positions
/// drift.
pub struct Document {
    tokenizer: Arc<dyn Tokenizer>,
    text: String,
    tokens: Vec<Token>,
    chars: usize,
}

impl Document {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = tokenizer.encode(&text);
        let chars = text.chars().count();
        Self {
            tokenizer,
            text,
            tokens,
            chars,
        }
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn char_count(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Decode tokens `[start, end)`. An empty range decodes to `""`.
    pub fn slice(&self, start: usize, end: usize) -> Result<String, TreeError> {
        if start > end || end > self.tokens.len() {
            return Err(TreeError::PositionOutOfRange {
                position: end.max(start),
                start: 0,
                end: self.tokens.len().saturating_sub(1),
            });
        }
        if start == end {
            return Ok(String::new());
        }
        self.tokenizer.decode(&self.tokens[start..end])
    }

    /// Token position reached after reading the first `char_idx` characters.
    pub fn position_for_char(&self, char_idx: usize) -> usize {
        if char_idx >= self.chars {
            return self.tokens.len();
        }
        let byte_idx = self
            .text
            .char_indices()
            .nth(char_idx)
            .map_or(self.text.len(), |(i, _)| i);
        self.tokenizer.count(&self.text[..byte_idx])
    }

    /// Token position for a reading progress fraction in `[0, 1]`.
    ///
    /// Capped at the last token, so a finished document still lands inside
    /// the final leaf.
    pub fn position_for_progress(&self, progress: f64) -> Result<usize, TreeError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(TreeError::InvalidProgress(progress));
        }
        if self.tokens.is_empty() {
            return Err(TreeError::EmptyInput);
        }
        let char_idx = (progress * self.chars as f64).floor() as usize;
        Ok(self
            .position_for_char(char_idx)
            .min(self.tokens.len() - 1))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("tokenizer", &self.tokenizer.name())
            .field("chars", &self.chars)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{BpeTokenizer, CharTokenizer};

    fn char_doc(text: &str) -> Document {
        Document::new(Arc::new(CharTokenizer), text)
    }

    #[test]
    fn slices_are_half_open() {
        let doc = char_doc("abcdefghij");
        assert_eq!(doc.token_count(), 10);
        assert_eq!(doc.slice(2, 5).unwrap(), "cde");
        assert_eq!(doc.slice(4, 4).unwrap(), "");
        assert_eq!(doc.slice(0, 10).unwrap(), "abcdefghij");
        assert!(doc.slice(5, 11).is_err());
        assert!(doc.slice(6, 5).is_err());
    }

    #[test]
    fn progress_maps_to_positions() {
        let doc = char_doc("abcdefghij");
        assert_eq!(doc.position_for_progress(0.0).unwrap(), 0);
        assert_eq!(doc.position_for_progress(0.5).unwrap(), 5);
        assert_eq!(doc.position_for_progress(0.99).unwrap(), 9);
        // A finished document is capped to the last token
        assert_eq!(doc.position_for_progress(1.0).unwrap(), 9);
    }

    #[test]
    fn invalid_progress_rejected() {
        let doc = char_doc("abc");
        for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                doc.position_for_progress(bad),
                Err(TreeError::InvalidProgress(_))
            ));
        }
        assert!(matches!(
            char_doc("").position_for_progress(0.5),
            Err(TreeError::EmptyInput)
        ));
    }

    #[test]
    fn char_positions_follow_bpe_tokens() {
        let bpe: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::cl100k().unwrap());
        let text = "The cook squatted in the bottom and looked with both eyes.";
        let doc = Document::new(bpe.clone(), text);
        assert_eq!(doc.position_for_char(0), 0);
        assert_eq!(doc.position_for_char(text.chars().count()), doc.token_count());
        let mid = doc.position_for_char(8);
        assert_eq!(mid, bpe.count("The cook"));
        assert!(mid < doc.token_count());
    }

    #[test]
    fn multibyte_text_is_indexed_by_char() {
        let doc = char_doc("héllo wörld");
        assert_eq!(doc.position_for_char(2), 2);
        assert_eq!(doc.slice(0, 5).unwrap(), "héllo");
    }
}
