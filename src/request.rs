//! Monitor request model and validation.
//!
//! A `MonitorRequest` is everything one monitoring run needs: who to log in
//! as, where and what to search for, which window of dates and times is
//! acceptable, and how often to poll. It is immutable for the lifetime of a
//! run and is validated before the loop is allowed to start.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use thiserror::Error;

/// Longest accepted polling interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Malformed or missing request fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{field}`: {value:?}")]
    Malformed { field: &'static str, value: String },
    #[error("unknown location {0:?}")]
    UnknownLocation(String),
    #[error("start date {start} is after end date {end}")]
    DateRange { start: NaiveDate, end: NaiveDate },
    #[error("start time {start} is after end time {end}")]
    TimeRange { start: NaiveTime, end: NaiveTime },
    #[error("at least one weekday must be selected")]
    NoWeekdays,
    #[error("at least one part of day must be selected")]
    NoDayParts,
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
    #[error("polling interval {0:?} exceeds 24 hours")]
    IntervalTooLong(Duration),
}

/// Coarse part of the day accepted by the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayPart {
    Morning,
    Afternoon,
}

impl DayPart {
    /// Numeric code used on the wire (Morning=0, Afternoon=1).
    pub fn code(self) -> u8 {
        match self {
            DayPart::Morning => 0,
            DayPart::Afternoon => 1,
        }
    }
}

impl fmt::Display for DayPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayPart::Morning => write!(f, "Morning"),
            DayPart::Afternoon => write!(f, "Afternoon"),
        }
    }
}

impl FromStr for DayPart {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" | "am" => Ok(DayPart::Morning),
            "afternoon" | "pm" => Ok(DayPart::Afternoon),
            _ => Err(ValidationError::Malformed {
                field: "parts_of_day",
                value: s.to_string(),
            }),
        }
    }
}

/// Credentials used for both the login and the search call.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub last_name: String,
    pub licence_number: String,
    pub keyword: String,
}

// Keeps licence numbers and keywords out of log output.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("last_name", &self.last_name)
            .field("licence_number", &"<redacted>")
            .field("keyword", &"<redacted>")
            .finish()
    }
}

/// A fully populated monitoring request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRequest {
    pub identity: Identity,
    pub location_id: u32,
    pub exam_class: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub weekdays: Vec<Weekday>,
    pub day_parts: Vec<DayPart>,
    pub interval: Duration,
    /// Cap on the number of matching slots kept per cycle.
    pub max_results: Option<usize>,
}

impl MonitorRequest {
    /// Check the request invariants. Called by `MonitorLoop::start`
    /// regardless of any validation done by whoever built the request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.identity.last_name.trim().is_empty() {
            return Err(ValidationError::Missing("last_name"));
        }
        if self.identity.licence_number.trim().is_empty() {
            return Err(ValidationError::Missing("licence_number"));
        }
        if self.identity.keyword.trim().is_empty() {
            return Err(ValidationError::Missing("keyword"));
        }
        if self.exam_class.trim().is_empty() {
            return Err(ValidationError::Missing("exam_class"));
        }
        if self.start_date > self.end_date {
            return Err(ValidationError::DateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.start_time > self.end_time {
            return Err(ValidationError::TimeRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.weekdays.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        if self.day_parts.is_empty() {
            return Err(ValidationError::NoDayParts);
        }
        if self.interval.is_zero() {
            return Err(ValidationError::ZeroInterval);
        }
        if self.interval > MAX_INTERVAL {
            return Err(ValidationError::IntervalTooLong(self.interval));
        }
        if self.max_results == Some(0) {
            return Err(ValidationError::Malformed {
                field: "max_results",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Exam type code sent to the search endpoint.
    pub fn exam_type(&self) -> String {
        format!("{}-R-1", self.exam_class.trim())
    }

    /// Sorted, de-duplicated weekday codes (Monday=0 .. Sunday=6).
    pub fn weekday_codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self
            .weekdays
            .iter()
            .map(|day| day.num_days_from_monday() as u8)
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    /// Sorted, de-duplicated day-part codes.
    pub fn day_part_codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self.day_parts.iter().map(|part| part.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::Malformed {
        field,
        value: value.to_string(),
    })
}

pub fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|_| ValidationError::Malformed {
        field,
        value: value.to_string(),
    })
}

pub fn parse_weekday(value: &str) -> Result<Weekday, ValidationError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| ValidationError::Malformed {
            field: "days",
            value: value.to_string(),
        })
}

/// Parse an interval such as `"0.5h"`, `"30m"` or `"90s"`.
pub fn parse_interval(value: &str) -> Result<Duration, ValidationError> {
    let malformed = || ValidationError::Malformed {
        field: "interval",
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let unit = trimmed.chars().last().ok_or_else(malformed)?;
    let multiplier = match unit.to_ascii_lowercase() {
        'h' => 3600.0,
        'm' => 60.0,
        's' => 1.0,
        _ => return Err(malformed()),
    };

    let amount: f64 = trimmed[..trimmed.len() - unit.len_utf8()]
        .trim()
        .parse()
        .map_err(|_| malformed())?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(malformed());
    }

    let secs = amount * multiplier;
    if secs > MAX_INTERVAL.as_secs_f64() {
        return Err(ValidationError::IntervalTooLong(Duration::from_secs_f64(secs)));
    }
    Ok(Duration::from_secs_f64(secs))
}
