// Response Library Module
// Canned responses selected by length name, randomly, or from the model's speed.

use crate::chunker::PARAGRAPH_SEPARATOR;
use crate::speed::{auto_response_length, content_tokens_for_duration, AutoResponseLength};
use crate::tokens::{estimate_tokens, tokens_to_chars};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selection mode that picks any response
pub const RANDOM_LENGTH: &str = "random";
/// Selection mode that picks a response from the model's speed
pub const AUTO_LENGTH: &str = "auto";
/// Response used when a requested length is not in the library
pub const DEFAULT_LENGTH: &str = "medium";

const PREVIEW_CHARS: usize = 50;

/// Token estimate and opening text of a library entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePreview {
    pub token_estimate: usize,
    pub preview: String,
}

/// Named canned responses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseLibrary {
    responses: BTreeMap<String, String>,
}

impl ResponseLibrary {
    pub fn new(responses: BTreeMap<String, String>) -> Self {
        Self { responses }
    }

    pub fn get(&self, length: &str) -> Option<&str> {
        self.responses.get(length).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.responses.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Resolve a requested length to a library entry name.
    ///
    /// `random` picks any entry, `auto` consults the speed rules, anything
    /// else is taken as a name.
    pub fn resolve_length<'a>(
        &'a self,
        requested: &'a str,
        tokens_per_second: f64,
        rules: &'a AutoResponseLength,
    ) -> &'a str {
        match requested {
            RANDOM_LENGTH => {
                let names: Vec<&str> = self.names().collect();
                names
                    .choose(&mut rand::rng())
                    .copied()
                    .unwrap_or(DEFAULT_LENGTH)
            }
            AUTO_LENGTH => auto_response_length(rules, tokens_per_second),
            name => name,
        }
    }

    /// Content for a requested length, falling back to the default entry
    /// and then to an empty response.
    pub fn select(
        &self,
        requested: &str,
        tokens_per_second: f64,
        rules: &AutoResponseLength,
    ) -> String {
        let length = self.resolve_length(requested, tokens_per_second, rules);
        self.get(length)
            .or_else(|| self.get(DEFAULT_LENGTH))
            .unwrap_or_default()
            .to_string()
    }

    pub fn previews(&self) -> BTreeMap<String, ResponsePreview> {
        self.responses
            .iter()
            .map(|(name, content)| {
                let preview = ResponsePreview {
                    token_estimate: estimate_tokens(content),
                    preview: preview(content),
                };
                (name.clone(), preview)
            })
            .collect()
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Upper bound on the size of a duration-fitted response, in characters
pub const MAX_FITTED_CHARS: usize = 100_000;

/// Resize content so that streaming it at `tokens_per_second` takes about
/// `duration_seconds`.
///
/// Short content is repeated paragraph-wise, long content is cut at the last
/// word boundary that fits. The result never exceeds `MAX_FITTED_CHARS`.
/// Content is returned unchanged when no sensible size can be derived from
/// the inputs.
pub fn fit_to_duration(content: &str, tokens_per_second: f64, duration_seconds: f64) -> String {
    let target_chars = tokens_to_chars(content_tokens_for_duration(
        tokens_per_second,
        duration_seconds,
    ))
    .min(MAX_FITTED_CHARS);
    if target_chars == 0 || content.trim().is_empty() {
        return content.to_string();
    }

    let base = content.trim();
    let base_chars = base.chars().count();
    let step = base_chars + PARAGRAPH_SEPARATOR.chars().count();
    let copies = 1 + target_chars.saturating_sub(base_chars).div_ceil(step);
    let text = vec![base; copies].join(PARAGRAPH_SEPARATOR);

    cut_at_word_boundary(&text, target_chars).to_string()
}

/// Longest prefix of at most `max_chars` characters ending on a word.
/// Always keeps the first word.
fn cut_at_word_boundary(text: &str, max_chars: usize) -> &str {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    if text[limit..].starts_with(char::is_whitespace) {
        return text[..limit].trim_end();
    }

    let head = &text[..limit];
    match head.rfind(char::is_whitespace) {
        Some(end) if !head[..end].trim().is_empty() => head[..end].trim_end(),
        _ => text.split_whitespace().next().unwrap_or(""),
    }
}
