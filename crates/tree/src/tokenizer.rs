//! Tokenizer adapters.
//!
//! The tree only needs two things from a tokenizer: a deterministic,
//! order-preserving `encode` (no special tokens added) and a `decode` that
//! turns any contiguous run of tokens back into text. Partitioning and
//! lookup must use the same instance so that offsets computed at build time
//! stay valid at query time.

use recap_core::TreeError;
use tiktoken_rs::CoreBPE;

/// A token id.
pub type Token = u32;

/// Maps text to position-addressable tokens and back.
pub trait Tokenizer: Send + Sync {
    /// Name of the encoding, recorded alongside built trees.
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Vec<Token>;

    fn decode(&self, tokens: &[Token]) -> Result<String, TreeError>;

    /// Number of tokens `text` encodes to.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Byte-pair encoding backed by `tiktoken-rs`.
pub struct BpeTokenizer {
    name: String,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Load a BPE encoding by name (`cl100k_base` or `o200k_base`).
    ///
    /// Fails fast when the encoding is unknown or cannot be loaded.
    pub fn new(encoding: &str) -> Result<Self, TreeError> {
        let lower = encoding.to_ascii_lowercase();
        let bpe = match lower.as_str() {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            _ => return Err(TreeError::Tokenizer(format!("Unsupported encoding: {encoding}"))),
        }
        .map_err(|e| TreeError::Tokenizer(format!("Failed to load {lower}: {e}")))?;

        Ok(Self { name: lower, bpe })
    }

    /// The encoding used by the GPT-3.5 / GPT-4 family.
    pub fn cl100k() -> Result<Self, TreeError> {
        Self::new("cl100k_base")
    }
}

impl Tokenizer for BpeTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[Token]) -> Result<String, TreeError> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| TreeError::Tokenizer(e.to_string()))
    }
}

/// One token per Unicode scalar value. Deterministic and offline; handy
/// for tests and for documents where exact model token counts don't matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn name(&self) -> &str {
        "char"
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        text.chars().map(|c| c as Token).collect()
    }

    fn decode(&self, tokens: &[Token]) -> Result<String, TreeError> {
        tokens
            .iter()
            .map(|&t| {
                char::from_u32(t)
                    .ok_or_else(|| TreeError::Tokenizer(format!("Invalid char token: {t}")))
            })
            .collect()
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Build the tokenizer named in configuration.
pub fn from_name(name: &str) -> Result<Box<dyn Tokenizer>, TreeError> {
    match name {
        "char" => Ok(Box::new(CharTokenizer)),
        other => Ok(Box::new(BpeTokenizer::new(other)?)),
    }
}
