//! Query windows.
//!
//! Platform queries are timezone-sensitive, so a range keeps the offset it
//! was built with. Naive date-times are always interpreted in the local zone.

use crate::{Error, Result};
use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

/// A `[start, end]` window of timezone-aware instants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthTimeRange {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl HealthTimeRange {
    /// Build a range from aware date-times, keeping their offsets
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        let start = start.fixed_offset();
        let end = end.fixed_offset();
        if end < start {
            return Err(Error::InvalidTimeRange(format!(
                "end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a range from naive date-times, treating both as local time
    pub fn from_local(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        Self::new(localize(start)?, localize(end)?)
    }

    /// Local midnight to the following local midnight
    pub fn for_local_day(date: NaiveDate) -> Result<Self> {
        let next = date
            .succ_opt()
            .ok_or_else(|| Error::InvalidTimeRange(format!("no day after {}", date)))?;
        Self::from_local(midnight(date)?, midnight(next)?)
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    /// Start as local wall-clock time, the form platform predicates take
    pub fn start_local(&self) -> DateTime<Local> {
        self.start.with_timezone(&Local)
    }

    pub fn end_local(&self) -> DateTime<Local> {
        self.end.with_timezone(&Local)
    }

    /// Never negative
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive on both ends
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_utc() && instant <= self.end_utc()
    }
}

/// Longest DST gap searched for an existing local time
const MAX_GAP_MINUTES: i64 = 24 * 60;

fn localize(naive: NaiveDateTime) -> Result<DateTime<Local>> {
    // Earliest instant on a DST fold
    if let Some(local) = Local.from_local_datetime(&naive).earliest() {
        return Ok(local);
    }

    // Skipped by a DST gap: first instant after the gap
    let minute = naive
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(naive);
    let resolved = (1..=MAX_GAP_MINUTES)
        .map(|m| minute + Duration::minutes(m))
        .find_map(|t| Local.from_local_datetime(&t).earliest())
        .ok_or_else(|| Error::InvalidTimeRange(format!("{} does not exist in local time", naive)))?;
    tracing::debug!("{} falls in a DST gap, using {}", naive, resolved);
    Ok(resolved)
}

fn midnight(date: NaiveDate) -> Result<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidTimeRange(format!("no midnight on {}", date)))
}
