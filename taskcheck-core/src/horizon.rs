//! Bounded date range over which events are expanded and time is allocated.

use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Serialize;

use crate::interval::{localize, start_of_day};

/// Inclusive range of calendar dates `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Horizon {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Horizon { start, end }
    }

    /// `[today, today + days]`, ending at the last representable date if that overflows.
    pub fn ahead(today: NaiveDate, days: u32) -> Self {
        Horizon {
            start: today,
            end: today
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// First instant of the range.
    pub fn start_instant(&self, tz: Tz) -> DateTime<Tz> {
        start_of_day(tz, self.start)
    }

    /// Last second of the range (23:59:59 on the end date).
    pub fn end_instant(&self, tz: Tz) -> DateTime<Tz> {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        localize(tz, self.end.and_time(last_second))
    }
}
