//! Calendar moments used to key scene requests.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// A UTC calendar date plus time-of-day at minute precision.
///
/// Field order matters: the derived ordering is year, then month/day
/// (equivalent to day-of-year), then time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimePoint")]
pub struct TimePoint {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl TimePoint {
    /// Create a validated time point.
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> PipelineResult<Self> {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(PipelineError::invalid_spec(format!(
                "{:04}-{:02}-{:02} is not a calendar date",
                year, month, day
            )));
        }
        if hour > 23 || minute > 59 {
            return Err(PipelineError::invalid_spec(format!(
                "{:02}:{:02} is not a time of day",
                hour, minute
            )));
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
        })
    }

    /// Day of year (1-366).
    pub fn day_of_year(&self) -> u32 {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .map(|d| d.ordinal())
            .unwrap_or(0)
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay {
            hour: self.hour,
            minute: self.minute,
        }
    }

    /// Convert to a UTC datetime.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, 0)
            .single()
    }

    /// Storage path component, e.g. `2019/03/01/1700`.
    pub fn storage_path(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}/{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// Unchecked wire form; deserialization goes through `TimePoint::new`.
#[derive(Deserialize)]
struct RawTimePoint {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
}

impl TryFrom<RawTimePoint> for TimePoint {
    type Error = PipelineError;

    fn try_from(raw: RawTimePoint) -> PipelineResult<Self> {
        TimePoint::new(raw.year, raw.month, raw.day, raw.hour, raw.minute)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// A UTC time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeOfDay")]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

#[derive(Deserialize)]
struct RawTimeOfDay {
    hour: u32,
    minute: u32,
}

impl TryFrom<RawTimeOfDay> for TimeOfDay {
    type Error = PipelineError;

    fn try_from(raw: RawTimeOfDay) -> PipelineResult<Self> {
        TimeOfDay::new(raw.hour, raw.minute)
    }
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> PipelineResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(PipelineError::invalid_spec(format!(
                "{:02}:{:02} is not a time of day",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `HH:MM` (or a bare hour such as `17`).
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let s = s.trim();
        let (h, m) = s.split_once(':').unwrap_or((s, "0"));
        let hour = h
            .parse()
            .map_err(|_| PipelineError::invalid_spec(format!("bad time of day '{}'", s)))?;
        let minute = m
            .parse()
            .map_err(|_| PipelineError::invalid_spec(format!("bad time of day '{}'", s)))?;
        Self::new(hour, minute)
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}Z", self.hour, self.minute)
    }
}

/// Number of days in a month, or None for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}
