//! Change detection: reconcile a snapshot against the registry.
//!
//! The diff is always taken against durable state inside the same write
//! transaction that applies it. Nothing is carried over in memory between
//! scans, so a failed apply simply rolls back and the next scan recomputes
//! the same diff.

use chrono::{DateTime, Utc};
use marketwatch_db::lifecycle::{self, LifecycleEvent};
use marketwatch_db::{Combination, EntryStatus, MonitorDb, RegistryEntry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::Result;
use crate::feed::Snapshot;
use crate::transitions::{record_transition, AuditOutcome};

/// Set difference between a snapshot and the active registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Observed but not active (new, or reappearing after UNCHECKED)
    pub appeared: BTreeSet<Combination>,
    /// Observed and active
    pub confirmed: Vec<RegistryEntry>,
    /// Active but not observed
    pub vanished: Vec<RegistryEntry>,
}

impl SnapshotDiff {
    pub fn compute(observed: &Snapshot, active: &[RegistryEntry]) -> Self {
        let active_by_key: BTreeMap<&Combination, &RegistryEntry> = active
            .iter()
            .filter(|entry| entry.status.is_active())
            .map(|entry| (&entry.combination, entry))
            .collect();

        let mut diff = SnapshotDiff::default();
        for combination in observed.combinations() {
            match active_by_key.get(combination) {
                Some(entry) => diff.confirmed.push((*entry).clone()),
                None => {
                    diff.appeared.insert(combination.clone());
                }
            }
        }

        diff.vanished = active_by_key
            .into_iter()
            .filter(|(combination, _)| !observed.combinations().contains(*combination))
            .map(|(_, entry)| entry.clone())
            .collect();

        diff
    }

    /// True when applying this diff would change nothing
    pub fn is_steady(&self) -> bool {
        self.appeared.is_empty()
            && self.vanished.is_empty()
            && self
                .confirmed
                .iter()
                .all(|entry| entry.status == EntryStatus::Checked)
    }
}

/// Outcome of one applied scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub observed: usize,
    /// First observations
    pub created: usize,
    /// UNCHECKED -> NEW
    pub reacquired: usize,
    /// NEW -> CHECKED
    pub graduated: usize,
    /// CHECKED and still present
    pub unchanged: usize,
    /// NEW/CHECKED -> UNCHECKED
    pub vanished: usize,
    pub audit_records: usize,
}

/// Applies snapshots to the registry and audit log.
#[derive(Clone)]
pub struct ChangeDetector {
    db: MonitorDb,
}

impl ChangeDetector {
    pub fn new(db: MonitorDb) -> Self {
        Self { db }
    }

    /// Apply a snapshot taken now.
    pub async fn apply(&self, snapshot: &Snapshot) -> Result<ApplyReport> {
        self.apply_at(snapshot, MonitorDb::now()).await
    }

    /// Apply a snapshot as of `now`, in a single transaction.
    pub async fn apply_at(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<ApplyReport> {
        let mut tx = self.db.begin_write().await?;

        let active = tx.read_active_set().await?;
        let diff = SnapshotDiff::compute(snapshot, &active);
        let mut report = ApplyReport {
            observed: snapshot.len(),
            ..ApplyReport::default()
        };

        for combination in &diff.appeared {
            let existing = tx.get(combination).await?;
            let from = existing.as_ref().map(|entry| entry.status);
            let transition = lifecycle::expect_event(combination, from, LifecycleEvent::Observed)?;

            match existing {
                None => {
                    tx.upsert(combination, EntryStatus::New, now).await?;
                    report.created += 1;
                }
                Some(_) => {
                    tx.transition(combination, EntryStatus::New, now).await?;
                    report.reacquired += 1;
                }
            }

            if record_transition(&mut tx, combination, &transition, now, None).await?
                == AuditOutcome::Written
            {
                report.audit_records += 1;
            }
        }

        for entry in &diff.confirmed {
            let transition = lifecycle::expect_event(
                &entry.combination,
                Some(entry.status),
                LifecycleEvent::Observed,
            )?;

            if transition.is_noop() {
                report.unchanged += 1;
                continue;
            }

            tx.transition(&entry.combination, EntryStatus::Checked, now)
                .await?;
            report.graduated += 1;
        }

        for entry in &diff.vanished {
            let transition = lifecycle::expect_event(
                &entry.combination,
                Some(entry.status),
                LifecycleEvent::Absent,
            )?;

            tx.transition(&entry.combination, EntryStatus::Unchecked, now)
                .await?;
            report.vanished += 1;

            if record_transition(&mut tx, &entry.combination, &transition, now, None).await?
                == AuditOutcome::Written
            {
                report.audit_records += 1;
            }
        }

        tx.commit().await?;

        info!(
            observed = report.observed,
            created = report.created,
            reacquired = report.reacquired,
            graduated = report.graduated,
            unchanged = report.unchanged,
            vanished = report.vanished,
            audit_records = report.audit_records,
            "Snapshot applied"
        );

        Ok(report)
    }

    /// Compute the diff a snapshot would produce, without writing.
    pub async fn plan(&self, snapshot: &Snapshot) -> Result<SnapshotDiff> {
        let active = self.db.active_entries().await?;
        let diff = SnapshotDiff::compute(snapshot, &active);
        debug!(
            appeared = diff.appeared.len(),
            confirmed = diff.confirmed.len(),
            vanished = diff.vanished.len(),
            "Snapshot planned"
        );
        Ok(diff)
    }
}
