//! Audit log operations (`changes_log`).
//!
//! Append-only: there is an insert on [`WriteTx`] and a set of reads on
//! [`MonitorDb`], nothing else.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::*;
use crate::{MonitorDb, WriteTx};

const AUDIT_COLUMNS: &str =
    "id, seller_name, item_name, change_type, old_value, new_value, detected_at";

impl WriteTx {
    /// Append one audit record and return its id.
    pub async fn record(
        &mut self,
        combination: &Combination,
        change_type: ChangeType,
        old_value: Option<EntryStatus>,
        new_value: Option<EntryStatus>,
        detected_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO changes_log (seller_name, item_name, change_type, old_value, new_value, detected_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(combination.seller())
        .bind(combination.item())
        .bind(change_type.as_str())
        .bind(old_value.map(|s| s.as_str()))
        .bind(new_value.map(|s| s.as_str()))
        .bind(detected_at.timestamp_millis())
        .execute(self.conn())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Whether a record of `change_type` exists for the combination with
    /// `detected_at` at or after `since`.
    pub async fn logged_since(
        &mut self,
        combination: &Combination,
        change_type: ChangeType,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM changes_log
                WHERE seller_name = ? AND item_name = ? AND change_type = ? AND detected_at >= ?
            ) as logged
            "#,
        )
        .bind(combination.seller())
        .bind(combination.item())
        .bind(change_type.as_str())
        .bind(since.timestamp_millis())
        .fetch_one(self.conn())
        .await?;

        Ok(row.try_get::<i64, _>("logged")? != 0)
    }
}

impl MonitorDb {
    /// Full history of one combination, oldest first
    pub async fn history_for(&self, combination: &Combination) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM changes_log
            WHERE seller_name = ? AND item_name = ?
            ORDER BY detected_at, id
            "#
        ))
        .bind(combination.seller())
        .bind(combination.item())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Every record detected at or after `since`, oldest first
    pub async fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM changes_log WHERE detected_at >= ? ORDER BY detected_at, id"
        ))
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Records with `from <= detected_at < to`, oldest first
    pub async fn history_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM changes_log
            WHERE detected_at >= ? AND detected_at < ?
            ORDER BY detected_at, id
            "#
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Total number of audit records
    pub async fn audit_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM changes_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("total")? as u64)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<AuditRecord> {
    let change_str: String = row.try_get("change_type")?;
    let change_type = ChangeType::parse(&change_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown change type: {}", change_str)))?;

    let seller: String = row.try_get("seller_name")?;
    let item: String = row.try_get("item_name")?;
    let combination = Combination::new(seller, item)
        .map_err(|e| DbError::invalid_state(format!("Corrupt audit key: {}", e)))?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        combination,
        change_type,
        old_value: parse_optional_status(row.try_get("old_value")?)?,
        new_value: parse_optional_status(row.try_get("new_value")?)?,
        detected_at: MonitorDb::millis_to_datetime(row.try_get("detected_at")?)?,
    })
}

fn parse_optional_status(raw: Option<String>) -> Result<Option<EntryStatus>> {
    raw.map(|s| {
        EntryStatus::parse(&s)
            .ok_or_else(|| DbError::invalid_state(format!("Unknown audit status value: {}", s)))
    })
    .transpose()
}
