//! Chunk partitioner: balanced, contiguous token slices.
//!
//! The document is encoded once and cut into `ceil(total / max)` slices.
//! Sizes are spread evenly instead of greedily filling each slice, so the
//! last slice is never a small remainder: every slice is either `base` or
//! `base + 1` tokens long, with the longer slices at the end.

use recap_core::TreeError;
use serde::{Deserialize, Serialize};

use crate::tokenizer::{Token, Tokenizer};

/// One leaf-level slice of the document.
///
/// `start_idx` and `end_idx` are inclusive offsets in the document's global
/// token space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub start_idx: usize,
    pub end_idx: usize,
    pub text: String,
}

impl Slice {
    /// Number of tokens in the slice (never zero).
    pub fn token_count(&self) -> usize {
        self.end_idx - self.start_idx + 1
    }
}

/// Sizes of the slices `total` tokens are split into.
///
/// The remainder `total % n` is handed out one token at a time starting
/// from the last slice and moving backward.
pub fn chunk_sizes(total: usize, max_chunk_size: usize) -> Result<Vec<usize>, TreeError> {
    if max_chunk_size == 0 {
        return Err(TreeError::InvalidChunkSize(max_chunk_size));
    }
    if total == 0 {
        return Err(TreeError::EmptyInput);
    }

    let num_chunks = total.div_ceil(max_chunk_size);
    let base = total / num_chunks;
    let remainder = total % num_chunks;

    let mut sizes = vec![base; num_chunks];
    for size in sizes.iter_mut().rev().take(remainder) {
        *size += 1;
    }
    Ok(sizes)
}

/// Inclusive `(start, end)` ranges for already-encoded tokens.
pub fn ranges(total: usize, max_chunk_size: usize) -> Result<Vec<(usize, usize)>, TreeError> {
    let mut start = 0;
    Ok(chunk_sizes(total, max_chunk_size)?
        .into_iter()
        .map(|size| {
            let range = (start, start + size - 1);
            start += size;
            range
        })
        .collect())
}

/// Slice pre-encoded tokens, decoding each slice's text.
pub fn partition_tokens(
    tokenizer: &dyn Tokenizer,
    tokens: &[Token],
    max_chunk_size: usize,
) -> Result<Vec<Slice>, TreeError> {
    ranges(tokens.len(), max_chunk_size)?
        .into_iter()
        .map(|(start_idx, end_idx)| {
            Ok(Slice {
                start_idx,
                end_idx,
                text: tokenizer.decode(&tokens[start_idx..=end_idx])?,
            })
        })
        .collect()
}

/// Encode `text` once and split it into balanced slices of at most
/// `max_chunk_size` tokens.
pub fn partition(
    tokenizer: &dyn Tokenizer,
    text: &str,
    max_chunk_size: usize,
) -> Result<Vec<Slice>, TreeError> {
    let tokens = tokenizer.encode(text);
    let slices = partition_tokens(tokenizer, &tokens, max_chunk_size)?;
    tracing::debug!(
        tokens = tokens.len(),
        slices = slices.len(),
        max_chunk_size,
        "Partitioned document"
    );
    Ok(slices)
}
