//! Calendar utilities. Rates are stored per UTC day.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InputResult, MalformedInputError};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// A calendar day normalized to UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtcDay(NaiveDate);

impl UtcDay {
    /// The UTC day containing `timestamp`.
    pub fn of(timestamp: Timestamp) -> Self {
        Self(timestamp.date_naive())
    }

    /// Current UTC day.
    pub fn today() -> Self {
        Self::of(now())
    }

    /// Build from year, month and day, rejecting impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> InputResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                MalformedInputError::with_field(
                    "day",
                    format!("{year:04}-{month:02}-{day:02} is not a calendar day"),
                )
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Midnight UTC of this day.
    pub fn start(&self) -> Timestamp {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// The day `days` before this one. Saturates at the earliest
    /// representable date.
    pub fn days_before(&self, days: u32) -> Self {
        Self(
            self.0
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
        )
    }

    pub fn next(&self) -> Self {
        Self(self.0.succ_opt().unwrap_or(NaiveDate::MAX))
    }
}

impl From<Timestamp> for UtcDay {
    fn from(timestamp: Timestamp) -> Self {
        Self::of(timestamp)
    }
}

impl fmt::Display for UtcDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
