//! Day-by-day view of an allocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::allocate::{Allocation, TaskAllocation};
use crate::availability::Availability;
use crate::interval::minutes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub from: NaiveDate,
    pub until: NaiveDate,
    pub days: Vec<DayReport>,
    /// Tasks with effort left over, in processing order.
    pub unplanned: Vec<Unplanned>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    /// Free time before any task was placed.
    #[serde(with = "minutes")]
    pub capacity: Duration,
    /// Free time left after allocation.
    #[serde(with = "minutes")]
    pub remaining: Duration,
    /// Ordered by the first slot each task got that day.
    pub tasks: Vec<PlannedWork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedWork {
    pub task_id: String,
    pub start: DateTime<Tz>,
    #[serde(with = "minutes")]
    pub allocated: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unplanned {
    pub task_id: String,
    #[serde(with = "minutes")]
    pub unallocated: Duration,
    /// Set when the task misses its deadline inside the horizon.
    pub deadline: Option<NaiveDate>,
}

/// Project `allocations` onto the dates `[availability start, until]`.
///
/// Dates past the computed horizon have no capacity.
pub fn render(allocations: &[TaskAllocation], availability: &Availability, until: NaiveDate) -> Report {
    let from = availability.horizon().start;

    let mut planned: BTreeMap<NaiveDate, Vec<PlannedWork>> = BTreeMap::new();
    for result in allocations {
        for slot in result.allocation.slots() {
            if slot.date < from || slot.date > until {
                continue;
            }
            let day = planned.entry(slot.date).or_default();
            match day.iter_mut().find(|work| work.task_id == result.task_id) {
                Some(work) => {
                    work.allocated += slot.duration();
                    work.start = work.start.min(slot.start);
                }
                None => day.push(PlannedWork {
                    task_id: result.task_id.clone(),
                    start: slot.start,
                    allocated: slot.duration(),
                }),
            }
        }
    }

    let days = from
        .iter_days()
        .take_while(|date| *date <= until)
        .map(|date| {
            let mut tasks = planned.remove(&date).unwrap_or_default();
            tasks.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.task_id.cmp(&b.task_id)));
            let capacity = availability.free_on(date);
            let used = tasks
                .iter()
                .fold(Duration::zero(), |acc, work| acc + work.allocated);
            DayReport {
                date,
                capacity,
                remaining: capacity - used,
                tasks,
            }
        })
        .collect();

    let unplanned = allocations
        .iter()
        .filter(|result| result.allocation.unallocated() > Duration::zero())
        .map(|result| Unplanned {
            task_id: result.task_id.clone(),
            unallocated: result.allocation.unallocated(),
            deadline: match &result.allocation {
                Allocation::Infeasible { deadline, .. } => Some(*deadline),
                _ => None,
            },
        })
        .collect();

    Report {
        from,
        until,
        days,
        unplanned,
    }
}
