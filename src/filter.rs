//! Date and time window filtering of raw search results.

use crate::request::MonitorRequest;
use crate::slot::Slot;

/// Applies the request's inclusive date and time-of-day windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotFilter;

impl SlotFilter {
    /// Keep slots inside both windows, in input order, without deduplication.
    ///
    /// Idempotent, so results the provider already narrowed by date can be
    /// passed through again safely.
    pub fn apply(&self, raw: &[Slot], request: &MonitorRequest) -> Vec<Slot> {
        raw.iter()
            .filter(|slot| Self::matches(slot, request))
            .copied()
            .collect()
    }

    pub fn matches(slot: &Slot, request: &MonitorRequest) -> bool {
        (request.start_date..=request.end_date).contains(&slot.date)
            && (request.start_time..=request.end_time).contains(&slot.start_time)
    }
}
