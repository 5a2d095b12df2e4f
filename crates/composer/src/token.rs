//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers
//! on English text, and keeps composition fully deterministic.

use promptforge_core::topic::Turn;

/// Per-section overhead for headers and delimiters in the rendered prompt.
pub const SECTION_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for one history turn: both sides of the exchange plus
/// section overhead for each.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    estimate_tokens(&turn.prompt) + estimate_tokens(&turn.response) + 2 * SECTION_OVERHEAD
}
