//! Expansion of feed events into concrete busy intervals over a horizon.
//!
//! Single events yield at most one interval, recurring events are expanded with
//! the rrule crate into a finite list bounded by the horizon. Components that
//! override a single occurrence (RECURRENCE-ID) are skipped and not reconciled
//! with their series.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::error::{TaskcheckError, TaskcheckResult};
use crate::horizon::Horizon;
use crate::ics::{EventTime, FeedEvent, parse_feed};
use crate::interval::{BusyInterval, Interval, localize, start_of_day};

/// Upper bound on occurrences generated per recurring event.
const MAX_OCCURRENCES: u16 = 10_000;

/// Parameters of one expansion run.
#[derive(Debug, Clone, Copy)]
pub struct ExpandOptions {
    /// Dates whose occurrences are kept; `start` is "today".
    pub horizon: Horizon,
    /// Block whole days for all-day events instead of ignoring them.
    pub include_all_day: bool,
    /// Zone used for floating times, all-day dates and the horizon.
    pub tz: Tz,
}

/// Parse `content` and expand every event into busy intervals, sorted by start.
pub fn expand(content: &str, options: &ExpandOptions) -> TaskcheckResult<Vec<BusyInterval>> {
    let events = parse_feed(content)?;

    let mut busy = Vec::new();
    for event in &events {
        busy.extend(expand_event(event, options)?);
    }
    busy.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    debug!(events = events.len(), intervals = busy.len(), "expanded feed");
    Ok(busy)
}

/// Expand one event. Returns no intervals for skipped events.
pub fn expand_event(event: &FeedEvent, options: &ExpandOptions) -> TaskcheckResult<Vec<BusyInterval>> {
    let tz = options.tz;

    let summary = event.summary.as_deref().unwrap_or_default();
    if event.recurrence_id.is_some() {
        debug!(uid = %event.uid, summary, "skipping recurrence override");
        return Ok(Vec::new());
    }

    let all_day = event.is_all_day(tz);
    if all_day && !options.include_all_day {
        debug!(uid = %event.uid, summary, "skipping all-day event");
        return Ok(Vec::new());
    }

    let start = if all_day {
        start_of_day(tz, event.start.resolve(tz).date_naive())
    } else {
        event.start.resolve(tz)
    };
    let duration = event.timed_duration(tz);

    let occurrences = match &event.rrule {
        Some(rrule) => {
            if start.date_naive() > options.horizon.end {
                return Ok(Vec::new());
            }
            let Some(rrule) = clip_until(rrule, &options.horizon, start, tz)? else {
                debug!(uid = %event.uid, "recurrence ends before horizon or first occurrence");
                return Ok(Vec::new());
            };
            let zone = if all_day { tz } else { event.start.zone(tz) };
            occurrences(event, &rrule, start, zone, all_day, options)?
        }
        None => vec![start],
    };

    Ok(occurrences
        .into_iter()
        .filter(|occ| options.horizon.contains(occ.date_naive()))
        .map(|occ| {
            if all_day {
                all_day_block(tz, occ.date_naive())
            } else {
                Interval::new(occ, occ + duration)
            }
        })
        .collect())
}

/// 00:00:00 to 23:59:59 on `date`.
fn all_day_block(tz: Tz, date: NaiveDate) -> BusyInterval {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Interval::new(start_of_day(tz, date), localize(tz, date.and_time(last_second)))
}

/// Rewrite the rule's UNTIL so expansion never runs past the horizon.
///
/// Returns `None` when the rule terminated before the horizon starts or before
/// its own first occurrence at `start`. The rewritten UNTIL is always in UTC, as
/// RFC 5545 requires for rules whose DTSTART carries a zone.
fn clip_until(
    rrule: &str,
    horizon: &Horizon,
    start: DateTime<Tz>,
    tz: Tz,
) -> TaskcheckResult<Option<String>> {
    let mut parts = Vec::new();

    for part in rrule.split(';').filter(|p| !p.is_empty()) {
        let Some(value) = part
            .strip_prefix("UNTIL=")
            .or_else(|| part.strip_prefix("until="))
        else {
            parts.push(part.to_string());
            continue;
        };

        let (until_date, until) = parse_until(value, tz)
            .ok_or_else(|| TaskcheckError::Parse(format!("invalid UNTIL '{value}' in RRULE")))?;

        if until_date < horizon.start || until < start.with_timezone(&Utc) {
            return Ok(None);
        }
        let until = if until_date > horizon.end {
            horizon.end_instant(tz).with_timezone(&Utc)
        } else {
            until
        };
        parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
    }

    Ok(Some(parts.join(";")))
}

/// The date as written and the instant an UNTIL value denotes.
fn parse_until(value: &str, tz: Tz) -> Option<(NaiveDate, DateTime<Utc>)> {
    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some((naive.date(), naive.and_utc()));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some((naive.date(), localize(tz, naive).with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    let last_second = NaiveTime::from_hms_opt(23, 59, 59)?;
    Some((date, localize(tz, date.and_time(last_second)).with_timezone(&Utc)))
}

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn build_rrule_string(start: DateTime<Tz>, zone: Tz, rrule: &str, exdates: &[DateTime<Tz>]) -> String {
    let mut lines = Vec::with_capacity(exdates.len() + 2);

    if zone == chrono_tz::UTC {
        lines.push(format!(
            "DTSTART:{}",
            start.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
        ));
    } else {
        lines.push(format!(
            "DTSTART;TZID={}:{}",
            zone.name(),
            start.with_timezone(&zone).format("%Y%m%dT%H%M%S")
        ));
    }

    lines.push(format!("RRULE:{rrule}"));

    for exdate in exdates {
        lines.push(format!(
            "EXDATE:{}",
            exdate.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
        ));
    }

    lines.join("\n")
}

/// Occurrence start instants of a recurring event that fall on horizon dates.
fn occurrences(
    event: &FeedEvent,
    rrule: &str,
    start: DateTime<Tz>,
    zone: Tz,
    all_day: bool,
    options: &ExpandOptions,
) -> TaskcheckResult<Vec<DateTime<Tz>>> {
    let tz = options.tz;

    let exdates: Vec<DateTime<Tz>> = event
        .exdates
        .iter()
        .map(|exdate| match exdate {
            EventTime::Date(d) if all_day => start_of_day(tz, *d),
            EventTime::Date(d) => localize(tz, d.and_time(start.time())),
            other => other.resolve(tz),
        })
        .collect();

    let rule_text = build_rrule_string(start, zone, rrule, &exdates);
    let rrule_set: RRuleSet = rule_text.parse().map_err(|e| {
        TaskcheckError::Parse(format!("Failed to parse RRULE for event '{}': {}", event.uid, e))
    })?;

    // Widen by a second on each side; the date filter in expand_event is exact.
    let rtz: rrule::Tz = Utc.into();
    let after = (options.horizon.start_instant(tz) - Duration::seconds(1))
        .with_timezone(&Utc)
        .with_timezone(&rtz);
    let before = (options.horizon.end_instant(tz) + Duration::seconds(1))
        .with_timezone(&Utc)
        .with_timezone(&rtz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(uid = %event.uid, limit = MAX_OCCURRENCES, "recurrence expansion truncated");
    }

    Ok(result
        .dates
        .iter()
        .map(|occ| occ.with_timezone(&tz))
        .collect())
}
