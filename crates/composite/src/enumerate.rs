//! Expansion of a composite request into the ordered set of time points to sample.

use std::collections::BTreeSet;

use goes_common::time::{days_in_month, is_leap_year};
use goes_common::{PipelineError, PipelineResult, Satellite, TimeOfDay, TimePoint};
use serde::{Deserialize, Serialize};

/// Inclusive range of years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

/// Which calendar days to sample in each year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DaySelection {
    /// The given days of each listed month.
    MonthDays { months: Vec<u32>, days: Vec<u32> },
    /// Every odd calendar day of each listed month (all months when empty).
    OddDays {
        #[serde(default)]
        months: Vec<u32>,
    },
    /// Explicit days of year (1-366).
    DaysOfYear { days: Vec<u32> },
}

/// Which times of day to sample on each selected day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimesOfDay {
    /// 00:00 through 23:00 (24 points).
    Hourly,
    /// Every 30 minutes (48 points).
    HalfHourly,
    Explicit { times: Vec<TimeOfDay> },
    /// The UTC hour nearest local solar noon under the satellite.
    LocalNoon { satellite: Satellite },
}

impl TimesOfDay {
    /// Resolve to a sorted, deduplicated list of times.
    pub fn resolve(&self) -> PipelineResult<Vec<TimeOfDay>> {
        let times: BTreeSet<TimeOfDay> = match self {
            TimesOfDay::Hourly => (0..24).map(|hour| TimeOfDay { hour, minute: 0 }).collect(),
            TimesOfDay::HalfHourly => (0..48)
                .map(|i| TimeOfDay {
                    hour: i / 2,
                    minute: (i % 2) * 30,
                })
                .collect(),
            TimesOfDay::Explicit { times } => {
                for t in times {
                    TimeOfDay::new(t.hour, t.minute)?;
                }
                times.iter().copied().collect()
            }
            TimesOfDay::LocalNoon { satellite } => {
                std::iter::once(satellite.local_noon_utc()).collect()
            }
        };

        if times.is_empty() {
            return Err(PipelineError::invalid_spec("no times of day selected"));
        }
        Ok(times.into_iter().collect())
    }
}

/// A composite request: years x days x times-of-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub years: YearRange,
    pub days: DaySelection,
    pub times: TimesOfDay,
}

impl CompositeSpec {
    /// Check the request without enumerating it.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.years.start > self.years.end {
            return Err(PipelineError::invalid_spec(format!(
                "year range {}..{} is empty",
                self.years.start, self.years.end
            )));
        }
        validate_days(&self.days)?;
        self.times.resolve()?;
        Ok(())
    }

    /// Every time point of the request, deduplicated and sorted by
    /// year, then day of year, then time of day.
    pub fn enumerate(&self) -> PipelineResult<Vec<TimePoint>> {
        self.validate()?;
        let times = self.times.resolve()?;

        let mut points = BTreeSet::new();
        for year in self.years.years() {
            for (month, day) in days_for_year(&self.days, year) {
                for t in &times {
                    points.insert(TimePoint {
                        year,
                        month,
                        day,
                        hour: t.hour,
                        minute: t.minute,
                    });
                }
            }
        }

        Ok(points.into_iter().collect())
    }
}

/// Longest the month can be in any year (February counts 29).
fn max_days_in_month(month: u32) -> Option<u32> {
    days_in_month(2000, month)
}

fn validate_months(months: &[u32]) -> PipelineResult<()> {
    for &month in months {
        if !(1..=12).contains(&month) {
            return Err(PipelineError::invalid_spec(format!(
                "month must be 1-12, got {}",
                month
            )));
        }
    }
    Ok(())
}

fn validate_days(selection: &DaySelection) -> PipelineResult<()> {
    match selection {
        DaySelection::MonthDays { months, days } => {
            if months.is_empty() || days.is_empty() {
                return Err(PipelineError::invalid_spec(
                    "month/day selection needs at least one month and one day",
                ));
            }
            validate_months(months)?;
            for &month in months {
                let max = max_days_in_month(month).unwrap_or(0);
                for &day in days {
                    if day == 0 || day > max {
                        return Err(PipelineError::invalid_spec(format!(
                            "day {} is outside month {} (1-{})",
                            day, month, max
                        )));
                    }
                }
            }
            Ok(())
        }
        DaySelection::OddDays { months } => validate_months(months),
        DaySelection::DaysOfYear { days } => {
            if days.is_empty() {
                return Err(PipelineError::invalid_spec("no days of year selected"));
            }
            for &doy in days {
                if !(1..=366).contains(&doy) {
                    return Err(PipelineError::invalid_spec(format!(
                        "day of year must be 1-366, got {}",
                        doy
                    )));
                }
            }
            Ok(())
        }
    }
}

/// (month, day) pairs of a validated selection that exist in `year`.
///
/// Feb 29 and day 366 only exist in leap years and are dropped otherwise.
fn days_for_year(selection: &DaySelection, year: i32) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    match selection {
        DaySelection::MonthDays { months, days } => {
            for &month in months {
                let len = days_in_month(year, month).unwrap_or(0);
                out.extend(days.iter().filter(|&&d| d <= len).map(|&d| (month, d)));
            }
        }
        DaySelection::OddDays { months } => {
            let months: Vec<u32> = if months.is_empty() {
                (1..=12).collect()
            } else {
                months.clone()
            };
            for month in months {
                let len = days_in_month(year, month).unwrap_or(0);
                out.extend((1..=len).step_by(2).map(|d| (month, d)));
            }
        }
        DaySelection::DaysOfYear { days } => {
            let year_len = if is_leap_year(year) { 366 } else { 365 };
            for &doy in days.iter().filter(|&&d| d <= year_len) {
                let mut remaining = doy;
                for month in 1..=12 {
                    let len = days_in_month(year, month).unwrap_or(0);
                    if remaining <= len {
                        out.push((month, remaining));
                        break;
                    }
                    remaining -= len;
                }
            }
        }
    }
    out
}
