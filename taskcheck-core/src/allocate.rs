//! Greedy allocation of task effort onto free time.
//!
//! Tasks are taken one at a time in [`task_order`] and each consumes the
//! earliest free time still left, so capacity claimed by one task is gone for
//! every task after it. The pass is deterministic and does not search for a
//! better global arrangement.
//!
//! A task limited to named time maps only draws from free time inside those
//! maps' windows.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::availability::Availability;
use crate::error::{TaskcheckError, TaskcheckResult};
use crate::horizon::Horizon;
use crate::interval::{FreeInterval, Interval, minutes, subtract};
use crate::working_hours::WorkingHoursTemplate;

/// A pending task as read from the task store.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub estimated: Duration,
    pub deadline: Option<DateTime<Utc>>,
    /// Wait date: no work is planned on or before this date.
    pub not_before: Option<DateTime<Utc>>,
    pub urgency: f64,
    /// Names of the time maps the task may use; empty means any working time.
    pub time_maps: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, estimated: Duration) -> Self {
        Task {
            id: id.into(),
            description: String::new(),
            estimated,
            deadline: None,
            not_before: None,
            urgency: 0.0,
            time_maps: Vec::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn with_time_maps<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.time_maps = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Processing order: earliest deadline first with undated tasks last, then
/// higher urgency, then task id.
pub fn task_order(a: &Task, b: &Task) -> Ordering {
    let by_deadline = match (a.deadline, b.deadline) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_deadline
        .then_with(|| b.urgency.total_cmp(&a.urgency))
        .then_with(|| a.id.cmp(&b.id))
}

/// A piece of free time given to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Slot {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Outcome of allocating one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Allocation {
    /// The whole estimate fits before the deadline.
    Feasible { slots: Vec<Slot> },
    /// Free time up to the deadline date ran out.
    Infeasible {
        slots: Vec<Slot>,
        #[serde(with = "minutes")]
        shortfall: Duration,
        deadline: NaiveDate,
    },
    /// The horizon ended first: the task has no deadline, or its deadline lies
    /// past the last computed date.
    BeyondHorizon {
        slots: Vec<Slot>,
        #[serde(with = "minutes")]
        unallocated: Duration,
    },
}

impl Allocation {
    pub fn slots(&self) -> &[Slot] {
        match self {
            Allocation::Feasible { slots }
            | Allocation::Infeasible { slots, .. }
            | Allocation::BeyondHorizon { slots, .. } => slots,
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, Allocation::Feasible { .. })
    }

    pub fn allocated(&self) -> Duration {
        self.slots()
            .iter()
            .fold(Duration::zero(), |acc, slot| acc + slot.duration())
    }

    /// Effort that could not be placed.
    pub fn unallocated(&self) -> Duration {
        match self {
            Allocation::Feasible { .. } => Duration::zero(),
            Allocation::Infeasible { shortfall, .. } => *shortfall,
            Allocation::BeyondHorizon { unallocated, .. } => *unallocated,
        }
    }

    /// Date work is first planned on.
    pub fn first_day(&self) -> Option<NaiveDate> {
        self.slots().first().map(|slot| slot.date)
    }

    /// Date work is last planned on, i.e. the expected completion date.
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.slots().last().map(|slot| slot.date)
    }

    /// Allocated time per date.
    pub fn per_day(&self) -> BTreeMap<NaiveDate, Duration> {
        let mut days = BTreeMap::new();
        for slot in self.slots() {
            *days.entry(slot.date).or_insert_with(Duration::zero) += slot.duration();
        }
        days
    }
}

/// One task's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskAllocation {
    pub task_id: String,
    #[serde(with = "minutes")]
    pub estimated: Duration,
    #[serde(flatten)]
    pub allocation: Allocation,
}

/// Runs the allocation one task at a time.
///
/// Each call to `next` places the next task in [`task_order`]; dropping the
/// allocator early discards the rest without side effects.
pub struct Allocator {
    tz: Tz,
    horizon: Horizon,
    days: BTreeMap<NaiveDate, Vec<FreeInterval>>,
    time_maps: BTreeMap<String, WorkingHoursTemplate>,
    queue: std::vec::IntoIter<Task>,
}

impl Allocator {
    pub fn new(tasks: &[Task], availability: &Availability) -> Self {
        let mut queue = tasks.to_vec();
        queue.sort_by(task_order);

        Allocator {
            tz: availability.tz(),
            horizon: *availability.horizon(),
            days: availability.clone().into_days(),
            time_maps: BTreeMap::new(),
            queue: queue.into_iter(),
        }
    }

    /// Resolve the tasks' time map names against `maps`.
    ///
    /// Fails when a pending task names a map that does not exist.
    pub fn with_time_maps(
        mut self,
        maps: &BTreeMap<String, WorkingHoursTemplate>,
    ) -> TaskcheckResult<Self> {
        for task in self.queue.as_slice() {
            if let Some(name) = task.time_maps.iter().find(|name| !maps.contains_key(*name)) {
                return Err(TaskcheckError::Config(format!(
                    "task {} uses unknown time map '{name}'",
                    task.id
                )));
            }
        }
        self.time_maps = maps.clone();
        Ok(self)
    }

    /// Tasks not yet placed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Free time still unclaimed on `date`.
    pub fn remaining_on(&self, date: NaiveDate) -> Duration {
        self.days
            .get(&date)
            .map(|free| crate::interval::total(free))
            .unwrap_or_else(Duration::zero)
    }

    /// The joined windows of the task's time maps, or `None` when it may use any time.
    fn allowed_template(&self, task: &Task) -> Option<WorkingHoursTemplate> {
        if task.time_maps.is_empty() {
            return None;
        }
        Some(
            task.time_maps
                .iter()
                .filter_map(|name| self.time_maps.get(name))
                .fold(WorkingHoursTemplate::new(), |acc, map| acc.union(map)),
        )
    }

    fn place(&mut self, task: &Task) -> Allocation {
        let tz = self.tz;
        let deadline = task.deadline.map(|d| d.with_timezone(&tz).date_naive());
        let wait = task.not_before.map(|w| w.with_timezone(&tz).date_naive());
        let allowed = self.allowed_template(task);

        let mut remaining = task.estimated.max(Duration::zero());
        let mut slots = Vec::new();

        for (date, free) in self.days.iter_mut() {
            if remaining <= Duration::zero() {
                break;
            }
            if deadline.is_some_and(|d| *date > d) {
                break;
            }
            if wait.is_some_and(|w| *date <= w) {
                continue;
            }

            let windows: Option<Vec<Interval>> = allowed.as_ref().map(|template| {
                template
                    .windows(date.weekday())
                    .iter()
                    .map(|window| window.on(*date, tz))
                    .collect()
            });

            let mut taken = Vec::new();
            for interval in free.iter() {
                let pieces = match &windows {
                    None => vec![*interval],
                    Some(windows) => windows
                        .iter()
                        .filter_map(|window| interval.intersection(window))
                        .collect(),
                };
                for piece in pieces {
                    if remaining <= Duration::zero() {
                        break;
                    }
                    let take = remaining.min(piece.duration());
                    if take <= Duration::zero() {
                        continue;
                    }
                    let end = piece.start + take;
                    slots.push(Slot {
                        date: *date,
                        start: piece.start,
                        end,
                    });
                    taken.push(Interval::new(piece.start, end));
                    remaining -= take;
                }
            }

            if !taken.is_empty() {
                *free = free
                    .iter()
                    .flat_map(|interval| subtract(*interval, &taken))
                    .collect();
            }
        }

        if remaining <= Duration::zero() {
            return Allocation::Feasible { slots };
        }
        match deadline {
            Some(deadline) if deadline <= self.horizon.end => Allocation::Infeasible {
                slots,
                shortfall: remaining,
                deadline,
            },
            _ => Allocation::BeyondHorizon {
                slots,
                unallocated: remaining,
            },
        }
    }
}

impl Iterator for Allocator {
    type Item = TaskAllocation;

    fn next(&mut self) -> Option<Self::Item> {
        let task = self.queue.next()?;
        let allocation = self.place(&task);

        debug!(
            task = %task.id,
            allocated_min = allocation.allocated().num_minutes(),
            unallocated_min = allocation.unallocated().num_minutes(),
            feasible = allocation.is_feasible(),
            "allocated task"
        );

        Some(TaskAllocation {
            task_id: task.id,
            estimated: task.estimated,
            allocation,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.queue.size_hint()
    }
}

/// Allocate every task against `availability`, in processing order.
pub fn allocate(tasks: &[Task], availability: &Availability) -> Vec<TaskAllocation> {
    Allocator::new(tasks, availability).collect()
}
