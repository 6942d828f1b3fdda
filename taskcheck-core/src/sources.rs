//! Busy time from every configured calendar.
//!
//! Calendars are fetched and expanded concurrently. A calendar that cannot be
//! fetched or parsed contributes nothing and the rest still count, unless the
//! caller asks for strict mode or the error is fatal to the whole run.

use chrono::NaiveDate;
use chrono_tz::Tz;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::cache::{Fetch, FeedCache};
use crate::config::CalendarSource;
use crate::error::{TaskcheckError, TaskcheckResult};
use crate::horizon::Horizon;
use crate::interval::{BusyInterval, Interval};
use crate::recurrence::{ExpandOptions, expand};

/// A calendar that was left out of the run.
#[derive(Debug)]
pub struct SourceFailure {
    pub name: String,
    pub error: TaskcheckError,
}

#[derive(Debug, Default)]
pub struct CollectedBusy {
    /// Busy intervals of all reachable calendars, sorted by start.
    pub busy: Vec<BusyInterval>,
    pub failures: Vec<SourceFailure>,
}

/// Fetch and expand every source. Each source uses its own lookahead from `today`.
///
/// With `strict`, the first failing source (in configuration order) fails the call.
pub async fn collect_busy<F: Fetch>(
    cache: &FeedCache<F>,
    sources: &[CalendarSource],
    today: NaiveDate,
    tz: Tz,
    strict: bool,
) -> TaskcheckResult<CollectedBusy> {
    let results = join_all(
        sources
            .iter()
            .map(|source| busy_for_source(cache, source, today, tz)),
    )
    .await;

    let mut collected = CollectedBusy::default();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(busy) => collected.busy.extend(busy),
            Err(error) if strict || error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(calendar = %source.name, error = %error, "skipping calendar");
                collected.failures.push(SourceFailure {
                    name: source.name.clone(),
                    error,
                });
            }
        }
    }

    collected
        .busy
        .sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    Ok(collected)
}

async fn busy_for_source<F: Fetch>(
    cache: &FeedCache<F>,
    source: &CalendarSource,
    today: NaiveDate,
    tz: Tz,
) -> TaskcheckResult<Vec<BusyInterval>> {
    let body = cache.fetch(&source.url, source.freshness).await?;

    let options = ExpandOptions {
        horizon: Horizon::ahead(today, source.days_ahead),
        include_all_day: source.include_all_day,
        tz: source.timezone.unwrap_or(tz),
    };
    let busy: Vec<BusyInterval> = expand(&body, &options)
        .map_err(|e| match e {
            TaskcheckError::Parse(msg) => TaskcheckError::Parse(format!("calendar '{}': {msg}", source.name)),
            other => other,
        })?
        .into_iter()
        .map(|iv| Interval::new(iv.start.with_timezone(&tz), iv.end.with_timezone(&tz)))
        .collect();

    debug!(calendar = %source.name, intervals = busy.len(), "collected busy time");
    Ok(busy)
}
