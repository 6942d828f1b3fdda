//! TUI rendering traits for taskcheck results.
//!
//! Extension traits that add colored terminal rendering to taskcheck-core
//! types using owo_colors.

use chrono::Duration;
use owo_colors::OwoColorize;
use taskcheck_core::report::{DayReport, Report};
use taskcheck_core::{Allocation, SourceFailure, Task, TaskAllocation};

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

/// `2h 30m`, `45m`, `0m`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_minutes().max(0);
    let (hours, minutes) = (total / 60, total % 60);
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// `12 ('Write report')`, or just the id when the task is unknown.
fn task_label(task_id: &str, task: Option<&Task>) -> String {
    match task.filter(|t| !t.description.is_empty()) {
        Some(task) => format!("{} ('{}')", task_id, task.description),
        None => task_id.to_string(),
    }
}

/// One line of `taskcheck check` output.
pub struct TaskLine<'a> {
    pub task: Option<&'a Task>,
    pub result: &'a TaskAllocation,
}

impl Render for TaskLine<'_> {
    fn render(&self) -> String {
        let label = task_label(&self.result.task_id, self.task);
        let span = match (self.result.allocation.first_day(), self.result.allocation.last_day()) {
            (Some(first), Some(last)) if first == last => format!("on {first}"),
            (Some(first), Some(last)) => format!("{first} → {last}"),
            _ => "nothing planned".to_string(),
        };

        match &self.result.allocation {
            Allocation::Feasible { .. } => {
                format!("{} Task {} {}", "✓".green(), label, span.dimmed())
            }
            Allocation::Infeasible {
                shortfall, deadline, ..
            } => {
                let line = format!("Task {label} may not be completed on time");
                let detail = format!(
                    "{} missing by {deadline}, {span}",
                    format_duration(*shortfall)
                );
                format!("{} {} {}", "✗".red(), line.red().bold(), detail.red())
            }
            Allocation::BeyondHorizon { unallocated, .. } => {
                let detail = format!("{} beyond the horizon, {span}", format_duration(*unallocated));
                format!("{} Task {} {}", "~".yellow(), label, detail.yellow())
            }
        }
    }
}

impl Render for SourceFailure {
    fn render(&self) -> String {
        format!("⚠ Calendar '{}' skipped: {}", self.name, self.error)
            .yellow()
            .to_string()
    }
}

/// Day-by-day schedule for `taskcheck report`.
pub struct ReportView<'a> {
    pub report: &'a Report,
    pub tasks: &'a [Task],
}

impl ReportView<'_> {
    fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn render_day(&self, day: &DayReport) -> Vec<String> {
        let header = format!("📅 {}", day.date.format("%a %Y-%m-%d"));
        let free = format!(
            "{} free, {} left",
            format_duration(day.capacity),
            format_duration(day.remaining)
        );
        let mut lines = vec![format!("{} {}", header.bold(), free.dimmed())];

        if day.tasks.is_empty() {
            lines.push("   Nothing planned".dimmed().to_string());
        }
        for work in &day.tasks {
            lines.push(format!(
                "   {} {}",
                task_label(&work.task_id, self.task(&work.task_id)),
                format_duration(work.allocated).cyan()
            ));
        }
        lines
    }
}

impl Render for ReportView<'_> {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        for (i, day) in self.report.days.iter().enumerate() {
            if i > 0 {
                lines.push(String::new());
            }
            lines.extend(self.render_day(day));
        }

        if !self.report.unplanned.is_empty() {
            lines.push(String::new());
            lines.push("Unplanned".red().bold().to_string());
            for item in &self.report.unplanned {
                let label = task_label(&item.task_id, self.task(&item.task_id));
                let due = item
                    .deadline
                    .map(|d| format!(" (due {d})"))
                    .unwrap_or_default();
                lines.push(format!(
                    "   {} {}{}",
                    label,
                    format_duration(item.unallocated).red(),
                    due.red()
                ));
            }
        }

        lines.join("\n")
    }
}
