//! Calendar feed parsing.
//!
//! Reads the VEVENT components of an iCalendar feed (RFC 5545) into
//! [`FeedEvent`] values that the recurrence expander turns into busy time.

mod event;
mod parse;

pub use event::{EventTime, FeedEvent};
pub use parse::parse_feed;
