use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::ActivityError;

pub const HOURS_PER_DAY: u8 = 24;

/// One hour of one day, printed as `YYYY-MM-DD-H` with an unpadded hour.
///
/// Ordering is chronological: date first, then hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampKey {
    date: NaiveDate,
    hour: u8,
}

impl TimestampKey {
    pub fn new(date: NaiveDate, hour: u8) -> Option<Self> {
        (hour < HOURS_PER_DAY).then_some(Self { date, hour })
    }

    pub fn from_parts(year: i32, month: u32, day: u32, hour: u8) -> Option<Self> {
        Self::new(NaiveDate::from_ymd_opt(year, month, day)?, hour)
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.date.format("%Y-%m-%d"), self.hour)
    }
}

impl FromStr for TimestampKey {
    type Err = ActivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ActivityError::InvalidTimestamp(s.to_string());

        // Date part is fixed width, so the hour follows the last dash.
        let (date, hour) = s.rsplit_once('-').ok_or_else(invalid)?;
        if date.len() != 10 || hour.is_empty() || hour.len() > 2 {
            return Err(invalid());
        }
        if hour.len() == 2 && hour.starts_with('0') {
            return Err(invalid());
        }

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;

        Self::new(date, hour).ok_or_else(invalid)
    }
}

/// Every hour of every calendar day of `year`, in ascending order.
pub fn year_timestamps(year: i32) -> impl Iterator<Item = TimestampKey> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .into_iter()
        .flat_map(|first| first.iter_days())
        .take_while(move |date| date.year() == year)
        .flat_map(|date| (0..HOURS_PER_DAY).map(move |hour| TimestampKey { date, hour }))
}
