//! CLI module for Marketwatch
//!
//! One-shot commands open the database, do one thing and exit. `run` hands
//! control to the scheduler until ctrl-c.

pub mod apply;
pub mod cleanup;
pub mod error;
pub mod history;
pub mod output;
pub mod registry;
pub mod run;

use marketwatch::{Monitor, MonitorConfig};
use std::path::PathBuf;

use crate::cli::error::HelpfulError;

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: MonitorConfig,
}

impl CliContext {
    /// Load the config file (explicit path or `~/.marketwatch/config.toml`)
    /// and apply command-line overrides.
    pub fn load(config_path: Option<PathBuf>, database: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => MonitorConfig::load(&path).map_err(HelpfulError::from)?,
            None => MonitorConfig::load_or_default(&MonitorConfig::default_path())
                .map_err(HelpfulError::from)?,
        };

        if let Some(database) = database {
            config.database_path = database;
        }

        Ok(Self { config })
    }

    /// Open the database, creating it if needed
    pub async fn open(&self) -> anyhow::Result<Monitor> {
        Ok(Monitor::open(self.config.clone())
            .await
            .map_err(HelpfulError::from)?)
    }

    /// Open a database that must already exist
    pub async fn open_existing(&self) -> anyhow::Result<Monitor> {
        if !self.config.database_path.exists() {
            return Err(HelpfulError::database_not_found(&self.config.database_path).into());
        }
        Ok(Monitor::open_existing(self.config.clone())
            .await
            .map_err(HelpfulError::from)?)
    }
}

/// Runtime for one-shot commands
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_override() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "retention_days = 3\n").unwrap();

        let ctx = CliContext::load(Some(config_path), Some(tmp.path().join("other.sqlite3")))
            .unwrap();
        assert_eq!(ctx.config.retention_days, 3);
        assert_eq!(ctx.config.database_path, tmp.path().join("other.sqlite3"));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let tmp = TempDir::new().unwrap();
        assert!(CliContext::load(Some(tmp.path().join("missing.toml")), None).is_err());
    }

    #[test]
    fn test_open_existing_reports_missing_database() {
        let tmp = TempDir::new().unwrap();
        let ctx = CliContext {
            config: MonitorConfig {
                database_path: tmp.path().join("missing.sqlite3"),
                ..MonitorConfig::default()
            },
        };

        let err = runtime()
            .unwrap()
            .block_on(ctx.open_existing())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Database not found"));
        assert!(!tmp.path().join("missing.sqlite3").exists());
    }
}
