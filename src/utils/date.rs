//! Resolving `--until` expressions to a date.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};

/// Turn an end-date expression into a concrete date.
///
/// Accepts `YYYY-MM-DD`, a plain day count (`3`), a duration from today
/// (`3d`, `2weeks`), or natural language such as `tomorrow` or `next friday`.
pub fn resolve_until(expr: &str, today: NaiveDate) -> Result<NaiveDate> {
    let expr = expr.trim();

    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(days) = expr.parse::<u64>() {
        return days_after(today, days, expr);
    }

    if let Ok(duration) = humantime::parse_duration(expr) {
        return days_after(today, duration.as_secs() / 86_400, expr);
    }

    if expr.eq_ignore_ascii_case("today") {
        return Ok(today);
    }

    let expanded = expand_abbreviations(expr);
    let datetime = fuzzydate::parse(&expanded)
        .map_err(|_| anyhow::anyhow!("Could not parse date: \"{expr}\""))?;
    Ok(datetime.date())
}

fn days_after(today: NaiveDate, days: u64, expr: &str) -> Result<NaiveDate> {
    today
        .checked_add_days(Days::new(days))
        .with_context(|| format!("Date out of range: \"{expr}\""))
}

/// Expand weekday abbreviations that fuzzydate doesn't handle.
fn expand_abbreviations(input: &str) -> String {
    let abbrevs = [
        ("mon", "monday"),
        ("tue", "tuesday"),
        ("tues", "tuesday"),
        ("wed", "wednesday"),
        ("thu", "thursday"),
        ("thur", "thursday"),
        ("thurs", "thursday"),
        ("fri", "friday"),
        ("sat", "saturday"),
        ("sun", "sunday"),
    ];

    input
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            abbrevs
                .iter()
                .find(|(abbr, _)| *abbr == word)
                .map(|(_, full)| (*full).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn iso_date_is_taken_as_is() {
        assert_eq!(
            resolve_until("2026-11-02", today()).unwrap(),
            NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
        );
    }

    #[test]
    fn day_counts_and_durations_are_relative_to_today() {
        assert_eq!(resolve_until("3", today()).unwrap(), NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
        assert_eq!(resolve_until("3d", today()).unwrap(), NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
        assert_eq!(resolve_until("1week", today()).unwrap(), NaiveDate::from_ymd_opt(2026, 10, 26).unwrap());
        assert_eq!(resolve_until("today", today()).unwrap(), today());
    }

    #[test]
    fn abbreviations_are_expanded() {
        assert_eq!(expand_abbreviations("next Fri"), "next friday");
        assert_eq!(expand_abbreviations("tomorrow"), "tomorrow");
    }

    #[test]
    fn far_future_is_an_error_not_a_panic() {
        assert!(resolve_until("4000000000", today()).is_err());
        assert!(resolve_until("10000000000d", today()).is_err());
    }

    #[test]
    fn nonsense_is_rejected() {
        assert!(resolve_until("whenever", today()).is_err());
    }
}
