//! Periodic scan and cleanup loop.
//!
//! Scans and cleanups are serialized through the database writer lock, so
//! the loop does not need any coordination of its own beyond running one
//! job at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{Disposition, MonitorError, Result};
use crate::feed::SnapshotFeed;
use crate::monitor::Monitor;

/// Counters for a scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub scans_applied: u64,
    pub scans_retried: u64,
    pub scans_rejected: u64,
    pub cleanups_run: u64,
    pub cleanups_retried: u64,
}

pub struct Scheduler {
    monitor: Monitor,
    feed: Arc<dyn SnapshotFeed>,
    scan_interval: Duration,
    cleanup_interval: Duration,
}

enum Job {
    Scan,
    Cleanup,
}

impl Scheduler {
    pub fn new(monitor: Monitor, feed: Arc<dyn SnapshotFeed>) -> Self {
        let scan_interval = monitor.config().scan_interval();
        let cleanup_interval = monitor.config().cleanup_interval();
        Self {
            monitor,
            feed,
            scan_interval,
            cleanup_interval,
        }
    }

    /// Override the configured intervals.
    pub fn with_intervals(mut self, scan: Duration, cleanup: Duration) -> Self {
        self.scan_interval = scan;
        self.cleanup_interval = cleanup;
        self
    }

    /// Run until `shutdown` resolves or a job fails with a fatal error.
    ///
    /// Both jobs fire once immediately on start.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<SchedulerSummary>
    where
        F: Future<Output = ()>,
    {
        let mut scan_tick = tokio::time::interval(self.scan_interval);
        scan_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_tick = tokio::time::interval(self.cleanup_interval);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        let mut summary = SchedulerSummary::default();

        info!(
            feed = self.feed.name(),
            scan_interval_secs = self.scan_interval.as_secs_f64(),
            cleanup_interval_secs = self.cleanup_interval.as_secs_f64(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(?summary, "Scheduler stopping");
                    return Ok(summary);
                }
                _ = scan_tick.tick() => {
                    match self.scan_once().await {
                        Ok(()) => {
                            self.feed.acknowledge();
                            summary.scans_applied += 1;
                        }
                        Err(err) => match route(Job::Scan, err)? {
                            Disposition::Retry => summary.scans_retried += 1,
                            _ => {
                                // A rejected snapshot is not retried either
                                self.feed.acknowledge();
                                summary.scans_rejected += 1;
                            }
                        },
                    }
                }
                _ = cleanup_tick.tick() => {
                    match self.monitor.run_cleanup().await {
                        Ok(_) => summary.cleanups_run += 1,
                        Err(err) => {
                            route(Job::Cleanup, err)?;
                            summary.cleanups_retried += 1;
                        }
                    }
                }
            }
        }
    }

    async fn scan_once(&self) -> Result<()> {
        let snapshot = self.feed.next_snapshot().await?;
        self.monitor.apply_snapshot(&snapshot).await?;
        Ok(())
    }
}

/// Log a failed job and decide whether the loop keeps going.
///
/// Returns the disposition for non-fatal errors and the error itself for
/// fatal ones. Cleanup has no input to reject, so a rejected cleanup is
/// treated as a retry.
fn route(job: Job, err: MonitorError) -> Result<Disposition> {
    let name = match job {
        Job::Scan => "scan",
        Job::Cleanup => "cleanup",
    };
    match err.disposition() {
        Disposition::Retry => {
            warn!(job = name, error = %err, "Job failed, retrying next tick");
            Ok(Disposition::Retry)
        }
        Disposition::Reject => {
            error!(job = name, error = %err, "Input rejected");
            Ok(Disposition::Reject)
        }
        Disposition::Halt => {
            error!(job = name, error = %err, "Fatal error, stopping scheduler");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::feed::{JsonFileFeed, Snapshot, StaticFeed};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FailingFeed {
        make_error: fn() -> MonitorError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotFeed for FailingFeed {
        fn name(&self) -> &str {
            "failing"
        }

        async fn next_snapshot(&self) -> Result<Snapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.make_error)())
        }
    }

    async fn test_monitor(tmp: &TempDir) -> Monitor {
        Monitor::open(MonitorConfig {
            database_path: tmp.path().join("scheduler.sqlite3"),
            ..MonitorConfig::default()
        })
        .await
        .unwrap()
    }

    fn fast(scheduler: Scheduler) -> Scheduler {
        scheduler.with_intervals(Duration::from_millis(10), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_scans_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        let monitor = test_monitor(&tmp).await;
        let feed = Arc::new(StaticFeed::new(
            Snapshot::from_pairs([("S1", "I1")]).unwrap(),
        ));

        let scheduler = fast(Scheduler::new(monitor.clone(), feed));
        let summary = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert!(summary.scans_applied >= 2);
        assert_eq!(summary.cleanups_run, 1);

        // Seen on more than one scan, so it has graduated
        let active = monitor.active_entries().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, marketwatch_db::EntryStatus::Checked);
    }

    #[tokio::test]
    async fn test_feed_errors_are_retried() {
        let tmp = TempDir::new().unwrap();
        let feed = Arc::new(FailingFeed {
            make_error: || MonitorError::feed("snapshot not written yet"),
            calls: AtomicUsize::new(0),
        });

        let scheduler = fast(Scheduler::new(test_monitor(&tmp).await, feed.clone()));
        let summary = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();

        assert_eq!(summary.scans_applied, 0);
        assert!(summary.scans_retried >= 2);
        assert_eq!(feed.calls.load(Ordering::SeqCst) as u64, summary.scans_retried);
    }

    #[tokio::test]
    async fn test_malformed_snapshots_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let feed = Arc::new(FailingFeed {
            make_error: || MonitorError::validation("entry 0: empty seller"),
            calls: AtomicUsize::new(0),
        });

        let scheduler = fast(Scheduler::new(test_monitor(&tmp).await, feed));
        let summary = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();

        assert!(summary.scans_rejected >= 1);
        assert_eq!(summary.scans_retried, 0);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_file_is_not_reapplied() {
        let tmp = TempDir::new().unwrap();
        let monitor = test_monitor(&tmp).await;
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, r#"[{"seller": "S1", "item": "I1"}]"#).unwrap();

        let feed = Arc::new(JsonFileFeed::new(&path));
        let scheduler = fast(Scheduler::new(monitor.clone(), feed));
        let summary = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(summary.scans_applied, 1);
        assert!(summary.scans_retried >= 1);

        // One capture means one observation, so no graduation
        let active = monitor.active_entries().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, marketwatch_db::EntryStatus::New);
    }

    #[tokio::test]
    async fn test_fatal_error_halts() {
        let tmp = TempDir::new().unwrap();
        let feed = Arc::new(FailingFeed {
            make_error: || MonitorError::config("bad feed configuration"),
            calls: AtomicUsize::new(0),
        });

        let scheduler = fast(Scheduler::new(test_monitor(&tmp).await, feed.clone()));
        let err = scheduler
            .run_until(std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Config(_)));
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }
}
