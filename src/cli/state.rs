// Application State Module

use super::config::Config;
use super::store::ConfigStore;
use crate::stats::SharedStats;
use std::path::PathBuf;

/// Shared application state
pub struct AppState {
    pub store: ConfigStore,
    pub stats: SharedStats,
    /// File the configuration was loaded from; reloads read it again
    pub config_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(config: Config, stats: SharedStats) -> Self {
        Self {
            store: ConfigStore::new(config),
            stats,
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}
