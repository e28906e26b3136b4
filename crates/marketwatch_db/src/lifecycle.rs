//! Lifecycle state machine for registry entries.
//!
//! ```text
//!  (none) --observed--> NEW --observed--> CHECKED --observed--> CHECKED
//!                        |                   |
//!                        +------absent-------+--> UNCHECKED --observed--> NEW
//!                                                     |
//!                                          retention expired
//!                                                     v
//!                                                 (deleted)
//! ```
//!
//! `None` stands for "no row". Every status write in the store is checked
//! against this table; anything not listed is an error.

use crate::error::{DbError, Result};
use crate::types::{ChangeType, Combination, EntryStatus};

/// Something that happened to a combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Present in the latest snapshot
    Observed,
    /// Missing from the latest snapshot
    Absent,
    /// Unchecked for longer than the retention window
    RetentionExpired,
}

/// Whether a transition produces an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditRule {
    None,
    Always(ChangeType),
    /// Only when no matching record has been written since the last status change
    UnlessLogged(ChangeType),
}

/// A valid edge of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<EntryStatus>,
    pub to: Option<EntryStatus>,
    pub audit: AuditRule,
}

impl Transition {
    /// True when the status stays the same (CHECKED seen again).
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Resolve an event against the current status.
pub fn on_event(from: Option<EntryStatus>, event: LifecycleEvent) -> Option<Transition> {
    use EntryStatus::*;
    use LifecycleEvent::*;

    let (to, audit) = match (from, event) {
        (None, Observed) => (Some(New), AuditRule::Always(ChangeType::NewItem)),
        (Some(New), Observed) => (Some(Checked), AuditRule::None),
        (Some(Checked), Observed) => (Some(Checked), AuditRule::None),
        (Some(Unchecked), Observed) => (Some(New), AuditRule::Always(ChangeType::NewItem)),
        (Some(New | Checked), Absent) => (Some(Unchecked), AuditRule::Always(ChangeType::ItemRemoved)),
        (Some(Unchecked), RetentionExpired) => {
            (None, AuditRule::UnlessLogged(ChangeType::ItemRemoved))
        }
        _ => return None,
    };

    Some(Transition { from, to, audit })
}

/// Like [`on_event`] but fails loudly for events that have no edge.
pub fn expect_event(
    combination: &Combination,
    from: Option<EntryStatus>,
    event: LifecycleEvent,
) -> Result<Transition> {
    on_event(from, event).ok_or_else(|| DbError::InvalidTransition {
        combination: combination.to_string(),
        from: describe(from).to_string(),
        to: format!("{:?}", event),
    })
}

/// Verify that writing `to` over `from` is a listed transition.
pub fn check(
    combination: &Combination,
    from: Option<EntryStatus>,
    to: Option<EntryStatus>,
) -> Result<Transition> {
    [
        LifecycleEvent::Observed,
        LifecycleEvent::Absent,
        LifecycleEvent::RetentionExpired,
    ]
    .into_iter()
    .filter_map(|event| on_event(from, event))
    .find(|transition| transition.to == to)
    .ok_or_else(|| DbError::InvalidTransition {
        combination: combination.to_string(),
        from: describe(from).to_string(),
        to: describe(to).to_string(),
    })
}

fn describe(status: Option<EntryStatus>) -> &'static str {
    match status {
        Some(status) => status.as_str(),
        None => "(none)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntryStatus::*;

    fn combo() -> Combination {
        Combination::new("S1", "I1").unwrap()
    }

    #[test]
    fn test_first_observation_creates_new() {
        let t = on_event(None, LifecycleEvent::Observed).unwrap();
        assert_eq!(t.to, Some(New));
        assert_eq!(t.audit, AuditRule::Always(ChangeType::NewItem));
    }

    #[test]
    fn test_graduation_is_silent() {
        let t = on_event(Some(New), LifecycleEvent::Observed).unwrap();
        assert_eq!(t.to, Some(Checked));
        assert_eq!(t.audit, AuditRule::None);

        let t = on_event(Some(Checked), LifecycleEvent::Observed).unwrap();
        assert!(t.is_noop());
    }

    #[test]
    fn test_reacquisition_resets_to_new() {
        let t = on_event(Some(Unchecked), LifecycleEvent::Observed).unwrap();
        assert_eq!(t.to, Some(New));
        assert_eq!(t.audit, AuditRule::Always(ChangeType::NewItem));
    }

    #[test]
    fn test_absence_logs_removal() {
        for from in [New, Checked] {
            let t = on_event(Some(from), LifecycleEvent::Absent).unwrap();
            assert_eq!(t.to, Some(Unchecked));
            assert_eq!(t.audit, AuditRule::Always(ChangeType::ItemRemoved));
        }
    }

    #[test]
    fn test_retention_only_applies_to_unchecked() {
        let t = on_event(Some(Unchecked), LifecycleEvent::RetentionExpired).unwrap();
        assert_eq!(t.to, None);
        assert_eq!(t.audit, AuditRule::UnlessLogged(ChangeType::ItemRemoved));

        assert!(on_event(Some(New), LifecycleEvent::RetentionExpired).is_none());
        assert!(on_event(Some(Checked), LifecycleEvent::RetentionExpired).is_none());
        assert!(on_event(None, LifecycleEvent::RetentionExpired).is_none());
    }

    #[test]
    fn test_unlisted_events() {
        assert!(on_event(None, LifecycleEvent::Absent).is_none());
        assert!(on_event(Some(Unchecked), LifecycleEvent::Absent).is_none());
        assert!(expect_event(&combo(), None, LifecycleEvent::Absent).is_err());
    }

    #[test]
    fn test_check_rejects_arbitrary_writes() {
        let c = combo();
        assert!(check(&c, None, Some(New)).is_ok());
        assert!(check(&c, Some(Unchecked), None).is_ok());

        for (from, to) in [
            (None, Some(Checked)),
            (None, Some(Unchecked)),
            (Some(Checked), Some(New)),
            (Some(New), Some(New)),
            (Some(Unchecked), Some(Checked)),
            (Some(New), None),
            (Some(Checked), None),
        ] {
            let err = check(&c, from, to).unwrap_err();
            assert!(matches!(err, DbError::InvalidTransition { .. }), "{:?} -> {:?}", from, to);
        }
    }
}
