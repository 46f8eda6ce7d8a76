// Token Estimator Module
// Character-heuristic token counting shared by chunk sizing and usage accounting.

/// Average number of characters per token for English text.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in a text.
///
/// Empty text is zero tokens; anything else is `len / 4` characters,
/// rounded down, but never less than one token.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

/// Approximate number of characters that `tokens` tokens occupy
pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}
