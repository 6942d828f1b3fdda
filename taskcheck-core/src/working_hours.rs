//! Weekly working-hours template and date-specific exceptions.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{TaskcheckError, TaskcheckResult};
use crate::interval::{Interval, localize};

/// A time-of-day range inside a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> TaskcheckResult<Self> {
        if end <= start {
            return Err(TaskcheckError::Config(format!(
                "working window {}-{} ends before it starts",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(TimeWindow { start, end })
    }

    /// The concrete interval this window covers on `date`.
    pub fn on(&self, date: NaiveDate, tz: Tz) -> Interval {
        Interval::new(
            localize(tz, date.and_time(self.start)),
            localize(tz, date.and_time(self.end)),
        )
    }
}

/// Sort a day's windows and reject overlaps.
fn normalize_day(mut windows: Vec<TimeWindow>, label: &str) -> TaskcheckResult<Vec<TimeWindow>> {
    windows.sort_by_key(|w| w.start);
    for pair in windows.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(TaskcheckError::Config(format!(
                "overlapping working windows on {}: {}-{} and {}-{}",
                label,
                pair[0].start.format("%H:%M"),
                pair[0].end.format("%H:%M"),
                pair[1].start.format("%H:%M"),
                pair[1].end.format("%H:%M"),
            )));
        }
    }
    Ok(windows)
}

/// Available work time on a typical day, per weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingHoursTemplate {
    days: [Vec<TimeWindow>; 7],
}

impl WorkingHoursTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the windows for `weekday`.
    pub fn set(&mut self, weekday: Weekday, windows: Vec<TimeWindow>) -> TaskcheckResult<()> {
        let label = format!("{weekday}");
        self.days[weekday.num_days_from_monday() as usize] = normalize_day(windows, &label)?;
        Ok(())
    }

    pub fn with(mut self, weekday: Weekday, windows: Vec<TimeWindow>) -> TaskcheckResult<Self> {
        self.set(weekday, windows)?;
        Ok(self)
    }

    pub fn windows(&self, weekday: Weekday) -> &[TimeWindow] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    /// True when no weekday has any window.
    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// Both templates' windows per weekday, with overlapping or touching windows joined.
    pub fn union(&self, other: &WorkingHoursTemplate) -> WorkingHoursTemplate {
        let mut joined = WorkingHoursTemplate::new();
        for (i, day) in joined.days.iter_mut().enumerate() {
            let mut windows: Vec<TimeWindow> =
                self.days[i].iter().chain(&other.days[i]).copied().collect();
            windows.sort_by_key(|w| w.start);
            for window in windows {
                match day.last_mut() {
                    Some(last) if window.start <= last.end => last.end = last.end.max(window.end),
                    _ => day.push(window),
                }
            }
        }
        joined
    }
}

/// One-off replacements of the template for specific dates.
///
/// An empty window list marks a day off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exceptions {
    dates: BTreeMap<NaiveDate, Vec<TimeWindow>>,
}

impl Exceptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, windows: Vec<TimeWindow>) -> TaskcheckResult<()> {
        let windows = normalize_day(windows, &date.to_string())?;
        self.dates.insert(date, windows);
        Ok(())
    }

    pub fn get(&self, date: NaiveDate) -> Option<&[TimeWindow]> {
        self.dates.get(&date).map(Vec::as_slice)
    }
}

/// The working windows that apply on `date`: the exception if present, else the template.
pub fn windows_for<'a>(
    template: &'a WorkingHoursTemplate,
    exceptions: &'a Exceptions,
    date: NaiveDate,
) -> &'a [TimeWindow] {
    exceptions
        .get(date)
        .unwrap_or_else(|| template.windows(date.weekday()))
}
