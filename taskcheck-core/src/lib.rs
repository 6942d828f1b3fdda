//! Availability and feasibility engine for taskcheck.
//!
//! Calendar feeds are fetched through [`cache::FeedCache`], expanded into busy
//! intervals by [`recurrence`], subtracted from working hours by
//! [`availability`], and task effort is then placed on the remaining free time
//! by [`allocate`]. [`report`] turns the result into a day-by-day view.

pub mod allocate;
pub mod availability;
pub mod cache;
pub mod config;
pub mod error;
pub mod horizon;
pub mod ics;
pub mod interval;
pub mod recurrence;
pub mod report;
pub mod sources;
pub mod working_hours;

pub use allocate::{Allocation, Allocator, Slot, Task, TaskAllocation, allocate, task_order};
pub use availability::{Availability, free_intervals};
pub use cache::{Fetch, FeedCache, HttpFetcher};
pub use config::{CalendarSource, Settings};
pub use error::{TaskcheckError, TaskcheckResult};
pub use horizon::Horizon;
pub use interval::{BusyInterval, FreeInterval, Interval};
pub use report::{Report, render};
pub use sources::{CollectedBusy, SourceFailure, collect_busy};
pub use working_hours::{Exceptions, TimeWindow, WorkingHoursTemplate};
