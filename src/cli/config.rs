// Server Configuration Module
// Handles configuration from YAML files and resolves per-session pacing settings.

use crate::generator::ResponseLibrary;
use crate::pacer::{PacerSettings, DEFAULT_TIME_BUDGET, DEFAULT_TRUNCATION_MESSAGE};
use crate::speed::{
    default_auto_response_length, merge_auto_response_length, AutoLengthOverride,
    AutoResponseLength,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseEntry>,
    /// Merged into the default categories, see `merge_auto_response_length`
    #[serde(
        default = "default_auto_response_length",
        deserialize_with = "deserialize_auto_response_length"
    )]
    pub auto_response_length: AutoResponseLength,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_budget("general", self.general.max_stream_time_seconds)?;
        for (name, model) in &self.models {
            if let Some(seconds) = model.max_stream_time_seconds {
                check_budget(name, seconds)?;
            }
        }
        Ok(())
    }

    pub fn is_known_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Settings used for models without an entry of their own
    pub fn default_model(&self) -> ModelConfig {
        ModelConfig {
            tokens_per_second: self.general.default_tokens_per_second,
            description: Some(self.general.default_model_description.clone()),
            parameters: Some(0.0),
            max_stream_time_seconds: None,
        }
    }

    pub fn model_description(&self, model: &str) -> String {
        self.models
            .get(model)
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| format!("Model {}", model))
    }

    /// Rate a model streams at; unknown models use the default rate
    pub fn tokens_per_second(&self, model: &str) -> f64 {
        self.models
            .get(model)
            .map(|m| m.tokens_per_second)
            .unwrap_or(self.general.default_tokens_per_second)
    }

    /// Pacing parameters for a new session on `model`
    pub fn session_settings(&self, model: &str) -> PacerSettings {
        let seconds = self
            .models
            .get(model)
            .and_then(|m| m.max_stream_time_seconds)
            .unwrap_or(self.general.max_stream_time_seconds);

        PacerSettings {
            tokens_per_second: self.tokens_per_second(model),
            time_budget: Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX),
            enforce_time_limit: self.general.enforce_time_limit,
            truncation_message: self.general.truncation_message.clone(),
        }
    }

    /// Canned responses, with a single sample entry when none are configured
    pub fn response_library(&self) -> ResponseLibrary {
        if self.responses.is_empty() {
            return ResponseLibrary::new(BTreeMap::from([(
                "medium".to_string(),
                SAMPLE_RESPONSE.to_string(),
            )]));
        }
        ResponseLibrary::new(
            self.responses
                .iter()
                .map(|(name, entry)| (name.clone(), entry.content.clone()))
                .collect(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            general: GeneralConfig::default(),
            models: BTreeMap::new(),
            responses: BTreeMap::new(),
            auto_response_length: default_auto_response_length(),
        }
    }
}

const SAMPLE_RESPONSE: &str = "This is a sample response from the OpenAI Stream Mocker.";

fn deserialize_auto_response_length<'de, D>(deserializer: D) -> Result<AutoResponseLength, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, AutoLengthOverride>::deserialize(deserializer)?;
    Ok(merge_auto_response_length(overrides))
}

/// Budgets must fit in a `Duration`
fn check_budget(scope: &str, seconds: f64) -> Result<(), ConfigError> {
    if Duration::try_from_secs_f64(seconds).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{}: max_stream_time_seconds must be a non-negative number of seconds, got {}",
            scope, seconds
        )))
    }
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Defaults shared by every model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    #[serde(default = "default_tokens_per_second")]
    pub default_tokens_per_second: f64,
    #[serde(default = "default_model_description")]
    pub default_model_description: String,
    /// Wall-clock budget per stream
    #[serde(default = "default_max_stream_time")]
    pub max_stream_time_seconds: f64,
    /// Truncate streams that exceed their budget
    #[serde(default)]
    pub enforce_time_limit: bool,
    #[serde(default = "default_truncation_message")]
    pub truncation_message: String,
    /// Response length used when a request names none
    #[serde(default = "default_response_mode")]
    pub default_response_mode: String,
    /// Reject models that are neither configured nor contain ':'
    #[serde(default)]
    pub strict_models: bool,
}

fn default_tokens_per_second() -> f64 {
    10.0
}

fn default_model_description() -> String {
    "Default configuration".to_string()
}

fn default_max_stream_time() -> f64 {
    DEFAULT_TIME_BUDGET.as_secs_f64()
}

fn default_truncation_message() -> String {
    DEFAULT_TRUNCATION_MESSAGE.to_string()
}

fn default_response_mode() -> String {
    "auto".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_tokens_per_second: default_tokens_per_second(),
            default_model_description: default_model_description(),
            max_stream_time_seconds: default_max_stream_time(),
            enforce_time_limit: false,
            truncation_message: default_truncation_message(),
            default_response_mode: default_response_mode(),
            strict_models: false,
        }
    }
}

/// Per-model settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_tokens_per_second")]
    pub tokens_per_second: f64,
    #[serde(default)]
    pub description: Option<String>,
    /// Parameter count in billions
    #[serde(default)]
    pub parameters: Option<f64>,
    /// Overrides the general budget for this model
    #[serde(default)]
    pub max_stream_time_seconds: Option<f64>,
}

impl ModelConfig {
    pub fn new(tokens_per_second: f64) -> Self {
        Self {
            tokens_per_second,
            description: None,
            parameters: None,
            max_stream_time_seconds: None,
        }
    }
}

/// A canned response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEntry {
    #[serde(default)]
    pub content: String,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}
