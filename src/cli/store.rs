// Config Store Module
// Shared, swappable configuration. Readers take an immutable snapshot;
// writers publish a modified copy.

use super::config::{Config, ModelConfig};
use crate::pacer::PacerSettings;
use crate::speed::estimate_speed_from_parameters;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whether a model update touched an existing entry or created one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelUpdate {
    Updated,
    Added,
}

/// Holds the live configuration.
///
/// A session resolves its settings from one snapshot and keeps them, so
/// updates only affect sessions started afterwards.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    // A panicking writer never leaves a half-built config behind, so a
    // poisoned lock still guards a consistent value.
    fn read(&self) -> RwLockReadGuard<'_, Arc<Config>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Config>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The current configuration
    pub fn snapshot(&self) -> Arc<Config> {
        self.read().clone()
    }

    /// Pacing settings for a new session on `model`
    pub fn session(&self, model: &str) -> PacerSettings {
        self.snapshot().session_settings(model)
    }

    /// Apply `f` to a copy of the configuration and publish the result
    pub fn update<R>(&self, f: impl FnOnce(&mut Config) -> R) -> R {
        let mut current = self.write();
        let mut next = Config::clone(&current);
        let result = f(&mut next);
        *current = Arc::new(next);
        result
    }

    pub fn replace(&self, config: Config) {
        *self.write() = Arc::new(config);
    }

    /// Set a model's rate, adding the model if it is not configured yet
    pub fn set_model_rate(
        &self,
        model: &str,
        tokens_per_second: f64,
        description: Option<String>,
    ) -> ModelUpdate {
        self.update(|config| match config.models.get_mut(model) {
            Some(existing) => {
                existing.tokens_per_second = tokens_per_second;
                ModelUpdate::Updated
            }
            None => {
                let mut entry = ModelConfig::new(tokens_per_second);
                entry.description =
                    Some(description.unwrap_or_else(|| format!("Custom model {}", model)));
                config.models.insert(model.to_string(), entry);
                ModelUpdate::Added
            }
        })
    }

    /// Set a model's parameter count and derive its rate from it.
    ///
    /// Returns the estimated rate along with what changed.
    pub fn set_model_parameters(
        &self,
        model: &str,
        params_billions: f64,
        description: Option<String>,
    ) -> (ModelUpdate, f64) {
        let speed = estimate_speed_from_parameters(params_billions);
        let outcome = self.update(|config| match config.models.get_mut(model) {
            Some(existing) => {
                existing.parameters = Some(params_billions);
                existing.tokens_per_second = speed;
                ModelUpdate::Updated
            }
            None => {
                let mut entry = ModelConfig::new(speed);
                entry.parameters = Some(params_billions);
                entry.description = Some(description.unwrap_or_else(|| {
                    format!("Model with {}B parameters", params_billions)
                }));
                config.models.insert(model.to_string(), entry);
                ModelUpdate::Added
            }
        });
        (outcome, speed)
    }

    pub fn set_default_rate(&self, tokens_per_second: f64) {
        self.update(|config| config.general.default_tokens_per_second = tokens_per_second);
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_snapshot_is_frozen() {
        let store = ConfigStore::default();
        let before = store.snapshot();
        let session = store.session("gpt-4");

        store.set_default_rate(99.0);

        assert_eq!(before.general.default_tokens_per_second, 10.0);
        assert_eq!(session.tokens_per_second, 10.0);
        assert_eq!(store.session("gpt-4").tokens_per_second, 99.0);
    }

    #[test]
    fn test_set_model_rate() {
        let store = ConfigStore::default();
        assert_eq!(store.set_model_rate("m", 12.0, None), ModelUpdate::Added);
        assert_eq!(
            store.snapshot().models["m"].description.as_deref(),
            Some("Custom model m")
        );

        assert_eq!(
            store.set_model_rate("m", 30.0, Some("ignored".into())),
            ModelUpdate::Updated
        );
        let config = store.snapshot();
        assert_eq!(config.models["m"].tokens_per_second, 30.0);
        assert_eq!(config.models["m"].description.as_deref(), Some("Custom model m"));
    }

    #[test]
    fn test_set_model_parameters() {
        let store = ConfigStore::default();
        let (outcome, speed) = store.set_model_parameters("big", 7.0, None);
        assert_eq!(outcome, ModelUpdate::Added);
        assert_eq!(speed, estimate_speed_from_parameters(7.0));

        let config = store.snapshot();
        assert_eq!(config.models["big"].parameters, Some(7.0));
        assert_eq!(config.models["big"].tokens_per_second, speed);
        assert_eq!(
            config.models["big"].description.as_deref(),
            Some("Model with 7B parameters")
        );

        let (outcome, _) = store.set_model_parameters("big", 70.0, None);
        assert_eq!(outcome, ModelUpdate::Updated);
        assert!(store.snapshot().models["big"].tokens_per_second < speed);
    }

    #[test]
    fn test_replace() {
        let store = ConfigStore::default();
        store.set_model_rate("temporary", 5.0, None);

        store.replace(Config::default());
        assert!(store.snapshot().models.is_empty());
    }

    #[test]
    fn test_concurrent_updates() {
        let store = Arc::new(ConfigStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        store.set_model_rate(&format!("model-{}-{}", i, j), 1.0, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot().models.len(), 400);
    }
}
