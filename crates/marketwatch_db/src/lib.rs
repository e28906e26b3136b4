//! Durable state for Marketwatch.
//!
//! This crate owns the three monitoring tables: the operational registry
//! (`monitoring_queue`), its read-optimized mirror (`sellers_current`) and the
//! append-only audit trail (`changes_log`). The reconciliation engine and the
//! cleanup job go through this crate for every read and write.
//!
//! # Usage
//!
//! ```rust,ignore
//! use marketwatch_db::{MonitorDb, EntryStatus, Result};
//!
//! let db = MonitorDb::open("~/.marketwatch/marketwatch.sqlite3").await?;
//!
//! // Writers hold the writer lock for the whole transaction
//! let mut tx = db.begin_write().await?;
//! let active = tx.read_active_set().await?;
//! tx.commit().await?;
//!
//! // Readers go straight to the pool
//! let history = db.history_since(since).await?;
//! ```

mod audit;
mod error;
pub mod lifecycle;
mod registry;
mod schema;
mod types;

pub use error::{DbError, Result};
pub use lifecycle::{AuditRule, LifecycleEvent, Transition};
pub use types::*;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// How long a connection waits on another process's write lock before
/// failing with SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the monitoring database.
///
/// Cloning is cheap; clones share the pool and the writer lock.
#[derive(Clone)]
pub struct MonitorDb {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl MonitorDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist, then validates the layout.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let db = Self::connect(&url).await?;

        db.ensure_schema().await?;
        db.validate_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Open an existing database (fails if not exists).
    ///
    /// No tables are created; the layout is only validated.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::NotFound(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());
        let db = Self::connect(&url).await?;
        db.validate_schema().await?;

        Ok(db)
    }

    async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Start a write transaction.
    ///
    /// Waits for any other writer to finish first, in this process through
    /// the writer lock and across processes through `BEGIN IMMEDIATE`, which
    /// takes SQLite's reserved lock before the first read. Dropping the
    /// returned transaction without committing rolls it back and releases
    /// both locks.
    pub async fn begin_write(&self) -> Result<WriteTx> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        debug!("Write transaction started");
        Ok(WriteTx { tx, _guard: guard })
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// An open write transaction holding the writer lock.
///
/// Every registry and audit mutation happens through this type so that a
/// scan or cleanup pass is applied all at once or not at all.
pub struct WriteTx {
    // Field order matters: the transaction rolls back before the lock is released.
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTx {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        debug!("Write transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!("Write transaction rolled back");
        Ok(())
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }
}

// Timestamp utilities
impl MonitorDb {
    /// Current time truncated to millisecond precision.
    pub fn now() -> DateTime<Utc> {
        let millis = Utc::now().timestamp_millis();
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    /// Convert milliseconds since the Unix epoch to a DateTime.
    pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DbError::invalid_state(format!("Timestamp out of range: {}", millis)))
    }
}
