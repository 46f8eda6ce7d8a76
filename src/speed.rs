// Model Speed Module
// Heuristics linking model size, streaming rate and response length.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rate of a very small model, in tokens per second
const BASE_SPEED: f64 = 25.0;
const MIN_ESTIMATED_SPEED: f64 = 1.0;
const MAX_ESTIMATED_SPEED: f64 = 20.0;

/// Response length used when no auto rule matches
pub const FALLBACK_RESPONSE_LENGTH: &str = "medium";

/// Estimate generation speed from a model's parameter count (in billions).
///
/// Larger models are slower: `25 * (1 / ln(params + 1))^1.5`, kept within
/// 1 to 20 tokens per second. Non-positive sizes get the base speed.
pub fn estimate_speed_from_parameters(params_billions: f64) -> f64 {
    if !(params_billions > 0.0) {
        return BASE_SPEED;
    }
    let speed = BASE_SPEED * (1.0 / (params_billions + 1.0).ln()).powf(1.5);
    speed.clamp(MIN_ESTIMATED_SPEED, MAX_ESTIMATED_SPEED)
}

/// Number of tokens a model streams in `duration_seconds`
pub fn content_tokens_for_duration(tokens_per_second: f64, duration_seconds: f64) -> usize {
    let tokens = tokens_per_second * duration_seconds;
    if tokens.is_finite() && tokens > 0.0 {
        tokens.floor() as usize
    } else {
        0
    }
}

/// Maps rates at or above `max_tokens_per_second` to a response length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLengthRule {
    pub max_tokens_per_second: f64,
    pub response_length: String,
}

impl AutoLengthRule {
    pub fn new(max_tokens_per_second: f64, response_length: impl Into<String>) -> Self {
        Self {
            max_tokens_per_second,
            response_length: response_length.into(),
        }
    }
}

/// Speed categories used by `response_length: auto`
pub type AutoResponseLength = BTreeMap<String, AutoLengthRule>;

pub fn default_auto_response_length() -> AutoResponseLength {
    BTreeMap::from([
        ("slow".to_string(), AutoLengthRule::new(3.0, "short")),
        ("medium".to_string(), AutoLengthRule::new(37.0, "medium")),
        ("long".to_string(), AutoLengthRule::new(77.0, "long")),
        (
            "fast".to_string(),
            AutoLengthRule::new(f64::INFINITY, "very_long"),
        ),
    ])
}

/// Partial rule from a config file; missing fields keep the default
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AutoLengthOverride {
    #[serde(default)]
    pub max_tokens_per_second: Option<f64>,
    #[serde(default)]
    pub response_length: Option<String>,
}

/// Apply configured overrides to the default categories.
///
/// Only the fields given are replaced. Categories outside the default
/// table are ignored.
pub fn merge_auto_response_length(
    overrides: BTreeMap<String, AutoLengthOverride>,
) -> AutoResponseLength {
    let mut rules = default_auto_response_length();
    for (category, update) in overrides {
        let Some(rule) = rules.get_mut(&category) else {
            tracing::warn!(category = %category, "Ignoring unknown auto_response_length category");
            continue;
        };
        if let Some(threshold) = update.max_tokens_per_second {
            rule.max_tokens_per_second = threshold;
        }
        if let Some(length) = update.response_length {
            rule.response_length = length;
        }
    }
    rules
}

/// Pick a response length for a model streaming at `tokens_per_second`.
///
/// Rules are tried from the highest threshold down; the first one the rate
/// reaches wins.
pub fn auto_response_length(rules: &AutoResponseLength, tokens_per_second: f64) -> &str {
    let mut ordered: Vec<&AutoLengthRule> = rules.values().collect();
    ordered.sort_by(|a, b| b.max_tokens_per_second.total_cmp(&a.max_tokens_per_second));

    ordered
        .into_iter()
        .find(|rule| tokens_per_second >= rule.max_tokens_per_second)
        .map(|rule| rule.response_length.as_str())
        .unwrap_or(FALLBACK_RESPONSE_LENGTH)
}
