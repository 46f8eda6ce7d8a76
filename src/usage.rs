// Usage Accountant Module
// Computes token usage from the prompt and the completion text actually delivered.

use crate::openai::{Message, Usage};
use crate::tokens::estimate_tokens;

/// Prompt text as seen by the estimator: message contents joined by single spaces.
///
/// Messages without content contribute an empty string, so they still add a
/// separator.
pub fn prompt_text(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Usage for a completion.
///
/// `completion` must be the text that was actually sent to the client, not
/// the full response that was planned.
pub fn calculate_usage(messages: &[Message], completion: &str) -> Usage {
    let prompt_tokens = saturate(estimate_tokens(&prompt_text(messages)));
    let completion_tokens = saturate(estimate_tokens(completion));
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
    }
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
