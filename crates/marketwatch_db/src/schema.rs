//! Database schema creation and startup validation.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::{DbError, Result};
use crate::MonitorDb;
use sqlx::Row;
use tracing::info;

/// Tables and the columns the store reads or writes.
const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "monitoring_queue",
        &["seller_name", "item_name", "status", "status_changed_at", "created_at"],
    ),
    (
        "sellers_current",
        &["seller_name", "item_name", "status", "status_changed_at", "created_at"],
    ),
    (
        "changes_log",
        &[
            "id",
            "seller_name",
            "item_name",
            "change_type",
            "old_value",
            "new_value",
            "detected_at",
        ],
    ),
];

impl MonitorDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Enable WAL mode so readers never wait on the writer
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        self.create_registry_tables().await?;
        self.create_audit_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Create the operational registry and its mirror.
    async fn create_registry_tables(&self) -> Result<()> {
        for table in ["monitoring_queue", "sellers_current"] {
            sqlx::query(&format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                    seller_name TEXT NOT NULL,
                    item_name TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('NEW', 'CHECKED', 'UNCHECKED')),
                    status_changed_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    UNIQUE (seller_name, item_name)
                )"#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_status ON {table}(status, status_changed_at)"
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Create the append-only audit trail.
    async fn create_audit_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS changes_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seller_name TEXT NOT NULL,
                item_name TEXT NOT NULL,
                change_type TEXT NOT NULL CHECK (change_type IN ('NEW_ITEM', 'ITEM_REMOVED')),
                old_value TEXT,
                new_value TEXT,
                detected_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_changes_log_combination ON changes_log(seller_name, item_name, detected_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_changes_log_detected ON changes_log(detected_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Check that every table and column the store touches is present.
    ///
    /// Runs at startup so a broken layout fails immediately instead of
    /// surfacing later as a write failure in the middle of a scan.
    pub async fn validate_schema(&self) -> Result<()> {
        for (table, columns) in EXPECTED_COLUMNS {
            let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
                .fetch_all(&self.pool)
                .await?;

            if rows.is_empty() {
                return Err(DbError::schema_mismatch(format!("table {table} is missing")));
            }

            let present = rows
                .iter()
                .map(|row| row.try_get::<String, _>("name"))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for column in columns.iter() {
                if !present.iter().any(|name| name == column) {
                    return Err(DbError::schema_mismatch(format!(
                        "column {table}.{column} is missing"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_validate_schema_detects_missing_column() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("legacy.db");

        // A legacy layout without created_at
        {
            let db = MonitorDb::open(&path).await.unwrap();
            sqlx::query("DROP TABLE sellers_current")
                .execute(db.pool())
                .await
                .unwrap();
            sqlx::query(
                "CREATE TABLE sellers_current (seller_name TEXT, item_name TEXT, status TEXT, status_changed_at INTEGER)",
            )
            .execute(db.pool())
            .await
            .unwrap();
            db.close().await;
        }

        let err = MonitorDb::open_existing(&path).await.err().unwrap();
        match err {
            DbError::SchemaMismatch(msg) => assert!(msg.contains("sellers_current.created_at")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_validate_schema_detects_missing_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("partial.db");

        {
            let db = MonitorDb::open(&path).await.unwrap();
            sqlx::query("DROP TABLE changes_log")
                .execute(db.pool())
                .await
                .unwrap();
            db.close().await;
        }

        let err = MonitorDb::open_existing(&path).await.err().unwrap();
        assert!(matches!(err, DbError::SchemaMismatch(_)));
        assert!(!err.is_transient());
    }
}
