// Engine settings with JSON persistence.

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default size of the local worker pool.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default remote poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Configuration shared by the execution engines.
///
/// Loaded from a JSON settings file; every field has a default so a missing
/// file yields a usable configuration. The poll interval is a cadence, not
/// a deadline - a remote run may stay active indefinitely unless canceled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Root directory under which run working directories are created.
    #[serde(rename = "workRoot")]
    pub work_root: PathBuf,
    /// Maximum number of concurrently executing local runs.
    #[serde(rename = "poolSize", default = "default_pool_size")]
    pub pool_size: usize,
    /// Seconds between remote state polls.
    #[serde(rename = "pollIntervalSecs", default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Container CLI binary used by the container worker.
    #[serde(rename = "containerBinary", default = "default_container_binary")]
    pub container_binary: String,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_container_binary() -> String {
    "docker".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("flowbench-work"),
            pool_size: DEFAULT_POOL_SIZE,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            container_binary: default_container_binary(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Settings(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Settings(format!("{}: {e}", path.display())))
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Settings(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| EngineError::Settings(format!("{}: {e}", path.display())))
    }

    /// The poll interval as a `Duration`.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}
