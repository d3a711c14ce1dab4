//! Engine configuration

use crate::advisor::RECOMMENDATION_WINDOW;
use crate::error::EngineError;
use crate::retention::RETENTION_DAYS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default history file, relative to the working directory
pub const DEFAULT_DATA_PATH: &str = "sleep_data.json";

/// Number of sessions shown in recent-record listings
pub const RECENT_RECORDS: usize = 5;

/// Largest accepted retention horizon (about 100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Engine tunables. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// History file used by the JSON store
    pub data_path: PathBuf,
    /// Sessions older than this many days are pruned
    pub retention_days: u32,
    /// Sessions averaged for recommendations
    pub recommendation_window: usize,
    /// Sessions listed by the recent-records view
    pub recent_records: usize,
    /// Run retention when the engine opens
    pub prune_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            retention_days: RETENTION_DAYS,
            recommendation_window: RECOMMENDATION_WINDOW,
            recent_records: RECENT_RECORDS,
            prune_on_start: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.recommendation_window == 0 {
            return Err(EngineError::ConfigError(
                "recommendation_window must be at least 1".to_string(),
            ));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(EngineError::ConfigError(format!(
                "retention_days must be at most {MAX_RETENTION_DAYS}"
            )));
        }
        if self.data_path.as_os_str().is_empty() {
            return Err(EngineError::ConfigError("data_path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }
}
