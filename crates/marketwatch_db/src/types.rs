//! Typed rows for the monitoring tables.
//!
//! Statuses and change types are closed enums; anything else read back from
//! storage is rejected instead of being passed through as a string.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::{DbError, Result};

// ============================================================================
// Combination
// ============================================================================

/// A tracked (seller, item) pair.
///
/// Both identifiers are non-empty. Normalization (casing, whitespace) is the
/// job of the capture pipeline; this type only refuses blanks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Combination {
    seller: String,
    item: String,
}

impl Combination {
    pub fn new(seller: impl Into<String>, item: impl Into<String>) -> Result<Self> {
        let seller = seller.into();
        let item = item.into();

        if seller.trim().is_empty() {
            return Err(DbError::InvalidCombination(format!(
                "empty seller identifier (item: {:?})",
                item
            )));
        }
        if item.trim().is_empty() {
            return Err(DbError::InvalidCombination(format!(
                "empty item identifier (seller: {:?})",
                seller
            )));
        }

        Ok(Self { seller, item })
    }

    pub fn seller(&self) -> &str {
        &self.seller
    }

    pub fn item(&self) -> &str {
        &self.item
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.seller, self.item)
    }
}

// ============================================================================
// Registry Types
// ============================================================================

/// Lifecycle status of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    /// Just observed (or re-observed), not yet confirmed
    New,
    /// Observed in at least two consecutive scans
    Checked,
    /// Absent from the latest scan, pending deletion
    Unchecked,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 3] = [Self::New, Self::Checked, Self::Unchecked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Checked => "CHECKED",
            Self::Unchecked => "UNCHECKED",
        }
    }

    /// Strict parse; stored values are always upper case.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "CHECKED" => Some(Self::Checked),
            "UNCHECKED" => Some(Self::Unchecked),
            _ => None,
        }
    }

    /// NEW and CHECKED entries make up the active set.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::Checked)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current state of one combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub combination: Combination,
    pub status: EntryStatus,
    pub status_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// What an upsert ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The row already existed and the write went through the transition path
    Updated,
}

/// Registry counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: u64,
    pub new: u64,
    pub checked: u64,
    pub unchecked: u64,
}

/// Differences between the operational table and its mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorDrift {
    pub missing_in_mirror: Vec<Combination>,
    pub missing_in_queue: Vec<Combination>,
    pub mismatched: Vec<(Combination, EntryStatus, EntryStatus)>,
}

impl MirrorDrift {
    pub fn is_clean(&self) -> bool {
        self.missing_in_mirror.is_empty()
            && self.missing_in_queue.is_empty()
            && self.mismatched.is_empty()
    }
}

// ============================================================================
// Audit Types
// ============================================================================

/// Kind of reportable change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NewItem,
    ItemRemoved,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewItem => "NEW_ITEM",
            Self::ItemRemoved => "ITEM_REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW_ITEM" => Some(Self::NewItem),
            "ITEM_REMOVED" => Some(Self::ItemRemoved),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub combination: Combination,
    pub change_type: ChangeType,
    /// Status before the change; `None` on first observation
    pub old_value: Option<EntryStatus>,
    /// Status after the change; `None` once the row is purged
    pub new_value: Option<EntryStatus>,
    pub detected_at: DateTime<Utc>,
}
