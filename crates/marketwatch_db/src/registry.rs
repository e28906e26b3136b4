//! Registry store operations (`monitoring_queue` + `sellers_current`).
//!
//! Writes only happen on a [`WriteTx`] and always touch both views in the
//! same transaction. The mirror row is copied from the operational row after
//! every write, so the two cannot disagree once the transaction commits.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::lifecycle;
use crate::types::*;
use crate::{MonitorDb, WriteTx};

const ENTRY_COLUMNS: &str = "seller_name, item_name, status, status_changed_at, created_at";

impl WriteTx {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Get the current entry for a combination
    pub async fn get(&mut self, combination: &Combination) -> Result<Option<RegistryEntry>> {
        fetch_entry(self.conn(), "monitoring_queue", combination).await
    }

    /// All entries with status NEW or CHECKED
    pub async fn read_active_set(&mut self) -> Result<Vec<RegistryEntry>> {
        fetch_active(self.conn()).await
    }

    /// UNCHECKED entries whose last status change is strictly before `cutoff`
    pub async fn read_stale(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<RegistryEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM monitoring_queue
            WHERE status = ? AND status_changed_at < ?
            ORDER BY status_changed_at, seller_name, item_name
            "#
        ))
        .bind(EntryStatus::Unchecked.as_str())
        .bind(cutoff.timestamp_millis())
        .fetch_all(self.conn())
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a combination, or route through [`WriteTx::transition`] if it
    /// already exists.
    ///
    /// A unique-key conflict on insert (another writer got there first) is
    /// not an error; the write falls back to the update path.
    pub async fn upsert(
        &mut self,
        combination: &Combination,
        status: EntryStatus,
        at: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        if self.get(combination).await?.is_some() {
            self.transition(combination, status, at).await?;
            return Ok(UpsertOutcome::Updated);
        }

        lifecycle::check(combination, None, Some(status))?;

        let result = sqlx::query(
            r#"
            INSERT INTO monitoring_queue (seller_name, item_name, status, status_changed_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(seller_name, item_name) DO NOTHING
            "#,
        )
        .bind(combination.seller())
        .bind(combination.item())
        .bind(status.as_str())
        .bind(at.timestamp_millis())
        .bind(at.timestamp_millis())
        .execute(self.conn())
        .await?;

        if result.rows_affected() == 0 {
            warn!(%combination, "Duplicate insert, falling back to status update");
            self.transition(combination, status, at).await?;
            return Ok(UpsertOutcome::Updated);
        }

        self.sync_mirror(combination).await?;
        debug!(%combination, %status, "Registry entry created");
        Ok(UpsertOutcome::Inserted)
    }

    /// Move an existing entry to `new_status`.
    ///
    /// Fails with [`DbError::InvalidTransition`] when the move is not in the
    /// lifecycle table. CHECKED -> CHECKED is accepted and writes nothing.
    pub async fn transition(
        &mut self,
        combination: &Combination,
        new_status: EntryStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let current = self
            .get(combination)
            .await?
            .ok_or_else(|| DbError::not_found(format!("registry entry {}", combination)))?;

        let transition = lifecycle::check(combination, Some(current.status), Some(new_status))?;
        if transition.is_noop() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE monitoring_queue SET status = ?, status_changed_at = ?
            WHERE seller_name = ? AND item_name = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(at.timestamp_millis())
        .bind(combination.seller())
        .bind(combination.item())
        .execute(self.conn())
        .await?;

        self.sync_mirror(combination).await?;
        debug!(%combination, from = %current.status, to = %new_status, "Registry entry transitioned");
        Ok(())
    }

    /// Physically remove an UNCHECKED entry from both views.
    ///
    /// Returns `false` if the row was already gone, which makes retries of
    /// a cleanup batch harmless.
    pub async fn delete(&mut self, combination: &Combination) -> Result<bool> {
        let current = match self.get(combination).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };

        lifecycle::check(combination, Some(current.status), None)?;

        for table in ["monitoring_queue", "sellers_current"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE seller_name = ? AND item_name = ?"
            ))
            .bind(combination.seller())
            .bind(combination.item())
            .execute(self.conn())
            .await?;
        }

        debug!(%combination, "Registry entry deleted");
        Ok(true)
    }

    /// Copy the operational row into the mirror.
    async fn sync_mirror(&mut self, combination: &Combination) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO sellers_current ({ENTRY_COLUMNS})
            SELECT {ENTRY_COLUMNS} FROM monitoring_queue
            WHERE seller_name = ? AND item_name = ?
            ON CONFLICT(seller_name, item_name) DO UPDATE SET
                status = excluded.status,
                status_changed_at = excluded.status_changed_at,
                created_at = excluded.created_at
            "#
        ))
        .bind(combination.seller())
        .bind(combination.item())
        .execute(self.conn())
        .await?;

        Ok(())
    }
}

// Read path for dashboards and the CLI. Never takes the writer lock.
impl MonitorDb {
    /// Current entry for a combination (operational view)
    pub async fn entry(&self, combination: &Combination) -> Result<Option<RegistryEntry>> {
        fetch_entry(&self.pool, "monitoring_queue", combination).await
    }

    /// Current entry for a combination as seen by the mirror
    pub async fn mirror_entry(&self, combination: &Combination) -> Result<Option<RegistryEntry>> {
        fetch_entry(&self.pool, "sellers_current", combination).await
    }

    /// All NEW and CHECKED entries, read from the mirror
    pub async fn active_entries(&self) -> Result<Vec<RegistryEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM sellers_current
            WHERE status IN ('NEW', 'CHECKED')
            ORDER BY seller_name, item_name
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Registry counts per status
    pub async fn registry_stats(&self) -> Result<RegistryStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'NEW' THEN 1 ELSE 0 END), 0) as new,
                COALESCE(SUM(CASE WHEN status = 'CHECKED' THEN 1 ELSE 0 END), 0) as checked,
                COALESCE(SUM(CASE WHEN status = 'UNCHECKED' THEN 1 ELSE 0 END), 0) as unchecked
            FROM monitoring_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RegistryStats {
            total: row.try_get::<i64, _>("total")? as u64,
            new: row.try_get::<i64, _>("new")? as u64,
            checked: row.try_get::<i64, _>("checked")? as u64,
            unchecked: row.try_get::<i64, _>("unchecked")? as u64,
        })
    }

    /// Compare both registry views row by row.
    pub async fn verify_mirror(&self) -> Result<MirrorDrift> {
        let queue = self.status_map("monitoring_queue").await?;
        let mirror = self.status_map("sellers_current").await?;

        let mut drift = MirrorDrift::default();
        for (combination, status) in &queue {
            match mirror.get(combination) {
                None => drift.missing_in_mirror.push(combination.clone()),
                Some(other) if other != status => {
                    drift.mismatched.push((combination.clone(), *status, *other))
                }
                Some(_) => {}
            }
        }
        drift.missing_in_queue = mirror
            .keys()
            .filter(|combination| !queue.contains_key(*combination))
            .cloned()
            .collect();

        Ok(drift)
    }

    async fn status_map(&self, table: &str) -> Result<BTreeMap<Combination, EntryStatus>> {
        let rows = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM {table}"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row_to_entry(row).map(|entry| (entry.combination, entry.status)))
            .collect()
    }
}

async fn fetch_entry<'e, E>(
    executor: E,
    table: &str,
    combination: &Combination,
) -> Result<Option<RegistryEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM {table} WHERE seller_name = ? AND item_name = ?"
    ))
    .bind(combination.seller())
    .bind(combination.item())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_entry).transpose()
}

async fn fetch_active<'e, E>(executor: E) -> Result<Vec<RegistryEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        r#"
        SELECT {ENTRY_COLUMNS} FROM monitoring_queue
        WHERE status IN ('NEW', 'CHECKED')
        ORDER BY seller_name, item_name
        "#
    ))
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

fn row_to_entry(row: &SqliteRow) -> Result<RegistryEntry> {
    let status_str: String = row.try_get("status")?;
    let status = EntryStatus::parse(&status_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown registry status: {}", status_str)))?;

    let seller: String = row.try_get("seller_name")?;
    let item: String = row.try_get("item_name")?;
    let combination = Combination::new(seller, item)
        .map_err(|e| DbError::invalid_state(format!("Corrupt registry key: {}", e)))?;

    Ok(RegistryEntry {
        combination,
        status,
        status_changed_at: MonitorDb::millis_to_datetime(row.try_get("status_changed_at")?)?,
        created_at: MonitorDb::millis_to_datetime(row.try_get("created_at")?)?,
    })
}
