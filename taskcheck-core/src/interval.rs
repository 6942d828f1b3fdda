//! Concrete time intervals and the interval arithmetic used by the availability model.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;

/// A half-open `[start, end)` range of instants in the run's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Time already committed in an external calendar.
pub type BusyInterval = Interval;

/// Uncommitted time inside a day's working window.
pub type FreeInterval = Interval;

impl Interval {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Interval { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The common part of both intervals, if any.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let clipped = Interval::new(self.start.max(other.start), self.end.min(other.end));
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Resolve a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are moved forward by the gap.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Midnight at the start of `date` in `tz`.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

/// Sort intervals and union the ones that overlap or touch.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|iv| !iv.is_empty());
    intervals.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// Remove `busy` from `window`.
///
/// `busy` must be sorted and non-overlapping (the output of [`merge`]).
/// The result is sorted, non-overlapping and contains no empty intervals.
pub fn subtract(window: Interval, busy: &[Interval]) -> Vec<Interval> {
    let mut free = Vec::new();
    let mut cursor = window.start;

    for b in busy {
        if b.end <= cursor {
            continue;
        }
        if b.start >= window.end {
            break;
        }
        if b.start > cursor {
            free.push(Interval::new(cursor, b.start));
        }
        if b.end > cursor {
            cursor = b.end;
        }
        if cursor >= window.end {
            break;
        }
    }

    if cursor < window.end {
        free.push(Interval::new(cursor, window.end));
    }
    free
}

/// Sum of the durations of `intervals`.
pub fn total(intervals: &[Interval]) -> Duration {
    intervals
        .iter()
        .fold(Duration::zero(), |acc, iv| acc + iv.duration())
}

/// Serialize a [`Duration`] as whole minutes.
pub mod minutes {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_minutes())
    }
}
