//! Per-day free time: working windows minus busy calendar time.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::horizon::Horizon;
use crate::interval::{self, BusyInterval, FreeInterval};
use crate::working_hours::{Exceptions, WorkingHoursTemplate, windows_for};

/// Free intervals for every date of a horizon.
///
/// Each day's list is sorted, non-overlapping, free of empty intervals, and
/// contained in that day's working windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    horizon: Horizon,
    #[serde(skip)]
    tz: Tz,
    days: BTreeMap<NaiveDate, Vec<FreeInterval>>,
}

/// Build the free-time model for `horizon`.
///
/// Busy intervals may come from several calendars and may overlap; they are
/// unioned before being subtracted from each day's working windows.
pub fn free_intervals(
    template: &WorkingHoursTemplate,
    exceptions: &Exceptions,
    busy: &[BusyInterval],
    horizon: &Horizon,
    tz: Tz,
) -> Availability {
    let busy = interval::merge(busy.to_vec());

    let days = horizon
        .dates()
        .map(|date| {
            let mut free: Vec<FreeInterval> = windows_for(template, exceptions, date)
                .iter()
                .flat_map(|window| {
                    let window = window.on(date, tz);
                    let first = busy.partition_point(|b| b.end <= window.start);
                    interval::subtract(window, &busy[first..])
                })
                .collect();
            free.sort_by_key(|iv| iv.start);
            (date, free)
        })
        .collect();

    Availability {
        horizon: *horizon,
        tz,
        days,
    }
}

impl Availability {
    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Free intervals on `date`; empty outside the horizon.
    pub fn day(&self, date: NaiveDate) -> &[FreeInterval] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Days in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[FreeInterval])> {
        self.days.iter().map(|(date, free)| (*date, free.as_slice()))
    }

    pub fn free_on(&self, date: NaiveDate) -> Duration {
        interval::total(self.day(date))
    }

    pub fn total_free(&self) -> Duration {
        self.days
            .values()
            .fold(Duration::zero(), |acc, free| acc + interval::total(free))
    }

    /// Drop time that is already in the past at `now`.
    ///
    /// Intervals ending at or before `now` disappear and the interval containing
    /// `now` starts at `now` instead.
    pub fn clip_before(mut self, now: DateTime<Tz>) -> Self {
        for free in self.days.values_mut() {
            free.retain(|iv| iv.end > now);
            for iv in free.iter_mut() {
                if iv.start < now {
                    iv.start = now;
                }
            }
        }
        self
    }

    pub(crate) fn into_days(self) -> BTreeMap<NaiveDate, Vec<FreeInterval>> {
        self.days
    }
}
