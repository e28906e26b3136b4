//! Retention cleanup for entries that stayed UNCHECKED too long.

use chrono::{DateTime, Duration, Utc};
use marketwatch_db::lifecycle::{self, LifecycleEvent};
use marketwatch_db::MonitorDb;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{MonitorError, Result};
use crate::transitions::{record_transition, AuditOutcome};

/// Outcome of one cleanup pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Entries whose last status change is strictly before this were eligible
    pub cutoff: DateTime<Utc>,
    pub purged: usize,
    pub audit_written: usize,
    /// Removals already logged by the scan that marked them UNCHECKED
    pub audit_suppressed: usize,
}

/// Purges UNCHECKED entries older than the retention window.
#[derive(Clone)]
pub struct CleanupJob {
    db: MonitorDb,
    retention: Duration,
}

impl CleanupJob {
    pub fn new(db: MonitorDb, retention: Duration) -> Result<Self> {
        if retention <= Duration::zero() {
            return Err(MonitorError::config(format!(
                "retention must be positive, got {}s",
                retention.num_seconds()
            )));
        }
        Ok(Self { db, retention })
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        self.run_at(MonitorDb::now()).await
    }

    /// Run one pass as of `now`. The whole pass commits or none of it does.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let cutoff = now - self.retention;
        let mut tx = self.db.begin_write().await?;

        let stale = tx.read_stale(cutoff).await?;
        let mut report = CleanupReport {
            cutoff,
            purged: 0,
            audit_written: 0,
            audit_suppressed: 0,
        };

        for entry in &stale {
            let transition = lifecycle::expect_event(
                &entry.combination,
                Some(entry.status),
                LifecycleEvent::RetentionExpired,
            )?;

            match record_transition(
                &mut tx,
                &entry.combination,
                &transition,
                now,
                Some(entry.status_changed_at),
            )
            .await?
            {
                AuditOutcome::Written => report.audit_written += 1,
                AuditOutcome::Suppressed => report.audit_suppressed += 1,
                AuditOutcome::NotRequired => {}
            }

            if tx.delete(&entry.combination).await? {
                report.purged += 1;
            } else {
                debug!(combination = %entry.combination, "Entry already gone");
            }
        }

        tx.commit().await?;

        info!(
            cutoff = %cutoff,
            purged = report.purged,
            audit_written = report.audit_written,
            audit_suppressed = report.audit_suppressed,
            "Cleanup finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_db(tmp: &TempDir) -> MonitorDb {
        MonitorDb::open(tmp.path().join("cleanup.sqlite3"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_non_positive_retention() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;

        let err = CleanupJob::new(db.clone(), Duration::zero()).err().unwrap();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(CleanupJob::new(db, Duration::days(-1)).is_err());
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;
        let job = CleanupJob::new(db.clone(), Duration::days(7)).unwrap();

        let now = MonitorDb::now();
        let report = job.run_at(now).await.unwrap();
        assert_eq!(report.cutoff, now - Duration::days(7));
        assert_eq!(report.purged, 0);
        assert_eq!(db.audit_count().await.unwrap(), 0);
    }
}
