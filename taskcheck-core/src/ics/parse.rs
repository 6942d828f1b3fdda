//! Feed parsing using the icalendar crate's parser.

use chrono::{NaiveDate, NaiveDateTime};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{TaskcheckError, TaskcheckResult};
use crate::ics::event::{EventTime, FeedEvent};

/// Parse every VEVENT in `content`.
///
/// Fails with [`TaskcheckError::Parse`] when the text is not an iCalendar
/// stream or an event lacks a usable DTSTART.
pub fn parse_feed(content: &str) -> TaskcheckResult<Vec<FeedEvent>> {
    let unfolded = unfold(content);
    if !unfolded
        .trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("BEGIN:VCALENDAR")
    {
        return Err(TaskcheckError::Parse(
            "feed does not start with BEGIN:VCALENDAR".into(),
        ));
    }

    let calendar = read_calendar(&unfolded)
        .map_err(|e| TaskcheckError::Parse(format!("invalid iCalendar data: {e}")))?;

    let mut vevents = Vec::new();
    for component in &calendar.components {
        collect_vevents(component, &mut vevents);
    }

    vevents.into_iter().map(parse_vevent).collect()
}

/// Walk nested components (VCALENDAR wrappers included) for VEVENTs.
fn collect_vevents<'a>(component: &'a Component<'a>, out: &mut Vec<&'a Component<'a>>) {
    if component.name == "VEVENT" {
        out.push(component);
        return;
    }
    for child in &component.components {
        collect_vevents(child, out);
    }
}

fn parse_vevent(vevent: &Component) -> TaskcheckResult<FeedEvent> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(no uid)".to_string());
    let summary = vevent.find_prop("SUMMARY").map(|p| p.val.to_string());

    let start = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .ok_or_else(|| TaskcheckError::Parse(format!("event '{uid}' has no valid DTSTART")))?;

    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    Ok(FeedEvent {
        uid,
        summary,
        start,
        end,
        duration,
        rrule,
        exdates,
        recurrence_id,
    })
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::DateTimeZoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// DURATION value (`PT1H30M`, `P1D`). Negative durations are ignored.
fn parse_duration(value: &str) -> Option<chrono::Duration> {
    let value = value.strip_prefix('+').unwrap_or(value);
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    chrono::Duration::from_std(std_duration).ok()
}

/// Parse an EXDATE property into a list of EventTime values.
///
/// Handles TZID and VALUE=DATE parameters, UTC and floating values, and
/// comma-separated lists.
fn parse_exdate_property(prop: &Property) -> Vec<EventTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EventTime::Date)
            } else if let Some(tz) = &tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|datetime| EventTime::DateTimeZoned {
                        datetime,
                        tzid: tz.clone(),
                    })
            } else if let Some(s) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeUtc(dt.and_utc()))
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(EventTime::DateTimeFloating)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn parses_timed_and_recurring_events() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:test
BEGIN:VEVENT
UID:test-event-1
DTSTART:20231205T140000Z
DTEND:20231205T150000Z
SUMMARY:Test Meeting
END:VEVENT
BEGIN:VEVENT
UID:test-event-2
DTSTART:20231206T100000Z
DTEND:20231206T110000Z
SUMMARY:Another Meeting
RRULE:FREQ=WEEKLY;COUNT=3
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, "test-event-1");
        assert_eq!(
            events[0].start,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2023, 12, 5, 14, 0, 0).unwrap())
        );
        assert_eq!(events[0].rrule, None);
        assert_eq!(events[1].rrule.as_deref(), Some("FREQ=WEEKLY;COUNT=3"));
    }

    #[test]
    fn parses_all_day_dates_and_zoned_times() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:test
BEGIN:VEVENT
UID:holiday
DTSTART;VALUE=DATE:20261225
DTEND;VALUE=DATE:20261226
END:VEVENT
BEGIN:VEVENT
UID:standup
DTSTART;TZID=Europe/Rome:20261019T093000
DTEND;TZID=Europe/Rome:20261019T094500
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).unwrap();

        assert_eq!(
            events[0].start,
            EventTime::Date(NaiveDate::from_ymd_opt(2026, 12, 25).unwrap())
        );
        assert!(events[0].is_all_day(chrono_tz::UTC));
        match &events[1].start {
            EventTime::DateTimeZoned { tzid, .. } => assert_eq!(tzid, "Europe/Rome"),
            other => panic!("Expected DateTimeZoned, got {:?}", other),
        }
        assert_eq!(events[1].timed_duration(chrono_tz::UTC), Duration::minutes(15));
    }

    #[test]
    fn duration_property_replaces_missing_dtend() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:test
BEGIN:VEVENT
UID:review
DTSTART:20261020T130000Z
DURATION:PT1H30M
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).unwrap();

        assert_eq!(events[0].end, None);
        assert_eq!(events[0].timed_duration(chrono_tz::UTC), Duration::minutes(90));
        assert!(!events[0].is_all_day(chrono_tz::UTC));
    }

    #[test]
    fn identical_start_and_end_counts_as_all_day() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:test
BEGIN:VEVENT
UID:marker
DTSTART:20261020T000000Z
DTEND:20261020T000000Z
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).unwrap();
        assert!(events[0].is_all_day(chrono_tz::UTC));
    }

    #[test]
    fn keeps_recurrence_id_and_exdates() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:series
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
RRULE:FREQ=WEEKLY;BYDAY=MO
EXDATE;TZID=America/New_York:20240108T100000,20240115T100000
EXDATE:20240122T100000Z
END:VEVENT
BEGIN:VEVENT
UID:series
RECURRENCE-ID:20240129T100000Z
DTSTART:20240129T120000Z
DTEND:20240129T130000Z
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).unwrap();

        assert_eq!(events[0].exdates.len(), 3);
        assert!(events[0].recurrence_id.is_none());
        assert!(events[1].recurrence_id.is_some());
    }

    #[test]
    fn ignores_non_event_components() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VTODO
UID:todo-1
DTSTART:20240101T100000Z
END:VTODO
BEGIN:VTIMEZONE
TZID:Europe/Rome
END:VTIMEZONE
END:VCALENDAR"#;

        assert!(parse_feed(ics).unwrap().is_empty());
    }

    #[test]
    fn event_without_dtstart_is_parse_error() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:broken
DTEND:20240101T110000Z
END:VEVENT
END:VCALENDAR"#;

        assert!(matches!(parse_feed(ics), Err(TaskcheckError::Parse(_))));
    }

    #[test]
    fn garbage_is_parse_error() {
        assert!(matches!(
            parse_feed("<html>503 Service Unavailable</html>"),
            Err(TaskcheckError::Parse(_))
        ));
    }
}
