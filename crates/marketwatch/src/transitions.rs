//! Audit side of a lifecycle transition.

use chrono::{DateTime, Utc};
use marketwatch_db::{AuditRule, Combination, Transition, WriteTx};
use tracing::debug;

use crate::error::Result;

/// What happened on the audit side of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuditOutcome {
    Written,
    /// A matching record already covers this change
    Suppressed,
    NotRequired,
}

/// Write the audit record a transition calls for, if any.
///
/// `last_change` is the entry's `status_changed_at` before this transition;
/// conditional records are skipped when one of the same kind was logged at or
/// after it.
pub(crate) async fn record_transition(
    tx: &mut WriteTx,
    combination: &Combination,
    transition: &Transition,
    at: DateTime<Utc>,
    last_change: Option<DateTime<Utc>>,
) -> Result<AuditOutcome> {
    let change_type = match transition.audit {
        AuditRule::None => return Ok(AuditOutcome::NotRequired),
        AuditRule::Always(change_type) => change_type,
        AuditRule::UnlessLogged(change_type) => {
            if let Some(since) = last_change {
                if tx.logged_since(combination, change_type, since).await? {
                    debug!(%combination, %change_type, "Audit record already present, suppressing");
                    return Ok(AuditOutcome::Suppressed);
                }
            }
            change_type
        }
    };

    tx.record(combination, change_type, transition.from, transition.to, at)
        .await?;
    Ok(AuditOutcome::Written)
}
