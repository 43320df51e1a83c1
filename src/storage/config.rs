//! Fusion session configuration.
//!
//! Stored as TOML in the platform data directory. A missing file yields the
//! built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sensors::filter::DEFAULT_ABSENT_THRESHOLD;
use crate::sensors::registry::PriorityTable;
use crate::sensors::types::DeviceKind;

/// Settings for one fusion session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Consecutive missing readings before a filtered value is dropped
    pub absent_threshold: u32,
    /// Wheel circumference in millimeters
    pub wheel_circumference_mm: u32,
    /// Drop accumulator increments while the session is paused
    pub respect_pause: bool,
    /// Seconds a device may search before the search is reported failed
    pub search_timeout_secs: u64,
    /// Capacity of the observer event channel
    pub event_capacity: usize,
    /// Identical-reading stall thresholds overriding the device class default
    pub stall_thresholds: BTreeMap<DeviceKind, u32>,
    /// Preferred device kinds per measurement kind
    pub priorities: PriorityTable,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            absent_threshold: DEFAULT_ABSENT_THRESHOLD,
            wheel_circumference_mm: 2100,
            respect_pause: true,
            search_timeout_secs: 30,
            event_capacity: 100,
            stall_thresholds: BTreeMap::new(),
            priorities: PriorityTable::default(),
        }
    }
}

impl FusionConfig {
    pub fn wheel_circumference_m(&self) -> f64 {
        self.wheel_circumference_mm as f64 / 1000.0
    }

    pub fn stall_threshold(&self, kind: DeviceKind) -> u32 {
        self.stall_thresholds
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.stall_threshold())
    }

    pub fn search_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.search_timeout_secs)
    }
}

/// Get the data directory path.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "providenceit", "RideFusion")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("fusion.toml")
}

/// Load configuration from the default location.
pub fn load_config() -> Result<FusionConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Save configuration to the default location.
pub fn save_config(config: &FusionConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Load configuration from `path`, falling back to defaults if it does not exist.
pub fn load_config_from(path: &Path) -> Result<FusionConfig, ConfigError> {
    if !path.exists() {
        tracing::info!("No config at {}, using defaults", path.display());
        return Ok(FusionConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save configuration to `path`.
pub fn save_config_to(config: &FusionConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
