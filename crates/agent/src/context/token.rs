//! Token estimation.
//!
//! Uses a byte-length heuristic: ~4 bytes per token, rounded up. Close
//! enough for BPE tokenizers on English text, and the assembly budget is
//! soft, so no real tokenizer is needed.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
