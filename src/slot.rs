use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::request::{DATE_FORMAT, TIME_FORMAT};

/// First line of every notification body.
pub const BODY_HEADER: &str = "Latest Appointments:";

/// A single offered appointment.
///
/// Identity is `(date, start_time)` with the time at minute precision. The
/// weekday is always derived from the date and never stored, so it cannot
/// disagree with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl Slot {
    /// Seconds and sub-seconds are dropped; snapshots persist `HH:MM`.
    pub fn new(date: NaiveDate, start_time: NaiveTime) -> Self {
        let start_time = start_time
            .with_second(0)
            .and_then(|time| time.with_nanosecond(0))
            .unwrap_or(start_time);
        Self { date, start_time }
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    /// Full English weekday name, e.g. "Monday".
    pub fn weekday_name(&self) -> String {
        self.date.format("%A").to_string()
    }

    pub fn date_str(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn time_str(&self) -> String {
        self.start_time.format(TIME_FORMAT).to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at {}",
            self.date_str(),
            self.weekday_name(),
            self.time_str()
        )
    }
}

/// The last known matching set of slots, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    slots: Vec<Slot>,
}

impl Snapshot {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.slots.iter()
    }

    /// Set of slot identities, ignoring order and duplicates.
    pub fn key_set(&self) -> HashSet<Slot> {
        self.slots.iter().copied().collect()
    }

    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.slots.iter().map(|slot| slot.date).min()
    }

    /// Keep the `limit` earliest slots by `(date, start_time)`. Survivors
    /// stay in arrival order.
    pub fn keep_earliest(&mut self, limit: usize) {
        if self.slots.len() <= limit {
            return;
        }

        let mut ranked: Vec<usize> = (0..self.slots.len()).collect();
        ranked.sort_by_key(|&index| (self.slots[index], index));
        ranked.truncate(limit);
        ranked.sort_unstable();

        self.slots = ranked.into_iter().map(|index| self.slots[index]).collect();
    }

    /// Human-readable rendering used as the notification body.
    pub fn render(&self) -> String {
        let mut body = String::from(BODY_HEADER);
        body.push('\n');
        for slot in &self.slots {
            body.push_str(&slot.to_string());
            body.push('\n');
        }
        body
    }
}

impl From<Vec<Slot>> for Snapshot {
    fn from(slots: Vec<Slot>) -> Self {
        Self::new(slots)
    }
}

impl FromIterator<Slot> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Slot;
    type IntoIter = std::slice::Iter<'a, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}
