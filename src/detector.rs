//! Snapshot comparison and the notify-or-not policy.
//!
//! Only a strictly earlier date than anything previously known is worth a
//! notification. Every other change (shuffles, later dates, removals) is
//! persisted silently, and the very first non-empty result is a baseline.

use chrono::NaiveDate;

use crate::slot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// No previous matches; the current set becomes the baseline.
    Baseline,
    /// A strictly earlier date than any previously known match appeared.
    EarlierDate {
        previous: NaiveDate,
        current: NaiveDate,
    },
    /// Any other difference between the two sets.
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoChange,
    Changed { reason: ChangeReason },
}

impl Decision {
    pub fn is_changed(&self) -> bool {
        matches!(self, Decision::Changed { .. })
    }

    pub fn notify_worthy(&self) -> bool {
        matches!(
            self,
            Decision::Changed {
                reason: ChangeReason::EarlierDate { .. }
            }
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn decide(&self, previous: &Snapshot, current: &Snapshot) -> Decision {
        if previous.key_set() == current.key_set() {
            return Decision::NoChange;
        }

        let reason = match (previous.earliest_date(), current.earliest_date()) {
            (None, _) => ChangeReason::Baseline,
            (Some(old), Some(new)) if new < old => ChangeReason::EarlierDate {
                previous: old,
                current: new,
            },
            _ => ChangeReason::Updated,
        };

        Decision::Changed { reason }
    }
}
