//! The `Monitor` context: one database handle plus configuration, shared by
//! the scheduler and the CLI.

use chrono::{DateTime, Duration, Utc};
use marketwatch_db::{AuditRecord, Combination, MonitorDb, RegistryEntry};
use std::path::Path;
use tracing::info;

use crate::cleanup::{CleanupJob, CleanupReport};
use crate::config::MonitorConfig;
use crate::detector::{ApplyReport, ChangeDetector, SnapshotDiff};
use crate::error::{MonitorError, Result};
use crate::feed::Snapshot;

#[derive(Clone)]
pub struct Monitor {
    db: MonitorDb,
    config: MonitorConfig,
    detector: ChangeDetector,
    cleanup: CleanupJob,
}

impl Monitor {
    /// Open (or create) the configured database and validate its layout.
    pub async fn open(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let db = MonitorDb::open(&config.database_path).await?;
        info!(path = %config.database_path.display(), "Monitor database opened");
        Self::new(db, config)
    }

    /// Open an existing database without creating anything.
    pub async fn open_existing(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let db = MonitorDb::open_existing(&config.database_path).await?;
        Self::new(db, config)
    }

    pub fn new(db: MonitorDb, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let detector = ChangeDetector::new(db.clone());
        let cleanup = CleanupJob::new(db.clone(), config.retention())?;
        Ok(Self {
            db,
            config,
            detector,
            cleanup,
        })
    }

    pub fn db(&self) -> &MonitorDb {
        &self.db
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn cleanup_job(&self) -> &CleanupJob {
        &self.cleanup
    }

    pub async fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<ApplyReport> {
        self.detector.apply(snapshot).await
    }

    pub async fn apply_snapshot_file(&self, path: &Path) -> Result<ApplyReport> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MonitorError::feed(format!("{}: {}", path.display(), e)))?;
        let snapshot = crate::feed::parse_snapshot_json(&content)?;
        self.apply_snapshot(&snapshot).await
    }

    pub async fn plan_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotDiff> {
        self.detector.plan(snapshot).await
    }

    /// NEW and CHECKED combinations, read from the mirror.
    pub async fn active_combinations(&self) -> Result<Vec<Combination>> {
        Ok(self
            .db
            .active_entries()
            .await?
            .into_iter()
            .map(|entry| entry.combination)
            .collect())
    }

    pub async fn active_entries(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.db.active_entries().await?)
    }

    /// Audit records detected at or after `since`, oldest first.
    pub async fn change_history(&self, since: DateTime<Utc>) -> Result<Vec<AuditRecord>> {
        Ok(self.db.history_since(since).await?)
    }

    /// Run cleanup now with the configured retention.
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        self.cleanup.run().await
    }

    /// Run cleanup now with an explicit retention window.
    pub async fn trigger_cleanup(&self, retention_days: u32) -> Result<CleanupReport> {
        if retention_days == 0 {
            return Err(MonitorError::config("retention_days must be at least 1"));
        }
        let job = CleanupJob::new(self.db.clone(), Duration::days(i64::from(retention_days)))?;
        job.run().await
    }
}
