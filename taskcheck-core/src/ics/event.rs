//! Events as they appear in a feed, before expansion.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::interval::{localize, start_of_day};

/// A DTSTART/DTEND/EXDATE value, keeping the form it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// The zone this value is anchored to. Floating values, dates and unknown
    /// TZIDs fall back to `run_tz`.
    pub fn zone(&self, run_tz: Tz) -> Tz {
        match self {
            EventTime::DateTimeUtc(_) => chrono_tz::UTC,
            EventTime::DateTimeZoned { tzid, .. } => tzid.parse().unwrap_or(run_tz),
            EventTime::Date(_) | EventTime::DateTimeFloating(_) => run_tz,
        }
    }

    /// The instant this value denotes, expressed in `run_tz`. Dates resolve to midnight.
    pub fn resolve(&self, run_tz: Tz) -> DateTime<Tz> {
        match self {
            EventTime::Date(d) => start_of_day(run_tz, *d),
            EventTime::DateTimeUtc(dt) => dt.with_timezone(&run_tz),
            EventTime::DateTimeFloating(naive) => localize(run_tz, *naive),
            EventTime::DateTimeZoned { datetime, .. } => {
                localize(self.zone(run_tz), *datetime).with_timezone(&run_tz)
            }
        }
    }
}

/// One VEVENT from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub uid: String,
    pub summary: Option<String>,
    pub start: EventTime,
    pub end: Option<EventTime>,
    /// DURATION, used when DTEND is absent.
    pub duration: Option<Duration>,
    /// Raw RRULE value, e.g. `FREQ=WEEKLY;BYDAY=MO`.
    pub rrule: Option<String>,
    pub exdates: Vec<EventTime>,
    /// Set on components that override a single occurrence of a series.
    pub recurrence_id: Option<EventTime>,
}

impl FeedEvent {
    /// Events without a time component, or with identical start and end, block whole days.
    pub fn is_all_day(&self, run_tz: Tz) -> bool {
        self.start.is_date() || self.timed_duration(run_tz) == Duration::zero()
    }

    /// Length of one occurrence of a timed event. Never negative.
    pub fn timed_duration(&self, run_tz: Tz) -> Duration {
        let length = match (&self.end, self.duration) {
            (Some(end), _) => end.resolve(run_tz) - self.start.resolve(run_tz),
            (None, Some(duration)) => duration,
            (None, None) => Duration::zero(),
        };
        length.max(Duration::zero())
    }
}
