//! Marketwatch: reconciles marketplace listing snapshots against a durable
//! registry of (seller, item) combinations.
//!
//! Each scan cycle hands the [`ChangeDetector`] the set of combinations it
//! observed. New listings enter as `NEW`, graduate to `CHECKED` when seen
//! again, and drop to `UNCHECKED` when they disappear. The [`CleanupJob`]
//! purges entries that stay `UNCHECKED` past the retention window. Every
//! appearance and removal lands in the append-only audit log.
//!
//! Storage lives in [`marketwatch_db`]; this crate adds the snapshot feed,
//! the scheduler and the [`Monitor`] query surface used by the CLI.

pub mod cleanup;
pub mod config;
pub mod detector;
pub mod error;
pub mod feed;
pub mod monitor;
pub mod scheduler;
mod transitions;

pub use cleanup::{CleanupJob, CleanupReport};
pub use config::MonitorConfig;
pub use detector::{ApplyReport, ChangeDetector, SnapshotDiff};
pub use error::{Disposition, MonitorError, Result};
pub use feed::{parse_snapshot_json, JsonFileFeed, Snapshot, SnapshotFeed, StaticFeed};
pub use monitor::Monitor;
pub use scheduler::{Scheduler, SchedulerSummary};
