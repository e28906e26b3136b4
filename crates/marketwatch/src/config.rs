//! Configuration for the monitor

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};

/// Main configuration, loaded from `~/.marketwatch/config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Path to the SQLite database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// JSON snapshot written by the capture pipeline each cycle
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Seconds between scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Seconds between cleanup passes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Days an entry stays UNCHECKED before it is purged
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_database_path() -> PathBuf {
    marketwatch_logging::marketwatch_home().join("marketwatch.sqlite3")
}

fn default_scan_interval() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    24 * 60 * 60
}

fn default_retention_days() -> u32 {
    7
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            snapshot_path: None,
            scan_interval_secs: default_scan_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            retention_days: default_retention_days(),
        }
    }
}

impl MonitorConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        marketwatch_logging::marketwatch_home().join("config.toml")
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: MonitorConfig = toml::from_str(&content)
            .map_err(|e| MonitorError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| MonitorError::config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| MonitorError::config(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_days == 0 {
            return Err(MonitorError::config("retention_days must be at least 1"));
        }
        if self.scan_interval_secs == 0 {
            return Err(MonitorError::config("scan_interval_secs must be positive"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(MonitorError::config("cleanup_interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_interval_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}
