//! Reading pending tasks from Taskwarrior's `task export` JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use taskcheck_core::Task;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Statuses that never need time.
const SKIPPED_STATUS: [&str; 3] = ["completed", "deleted", "recurring"];

/// Taskwarrior's date format in exports.
const TW_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Where task records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    /// Run `task export`.
    Taskwarrior,
    File(PathBuf),
    Stdin,
}

impl TaskSource {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => TaskSource::Taskwarrior,
            Some("-") => TaskSource::Stdin,
            Some(path) => TaskSource::File(PathBuf::from(path)),
        }
    }
}

/// One record of `task export`. Only the fields used for planning.
#[derive(Debug, Deserialize)]
struct ExportedTask {
    #[serde(default)]
    id: u64,
    uuid: String,
    #[serde(default)]
    description: String,
    status: String,
    due: Option<String>,
    wait: Option<String>,
    /// User-defined attribute holding the effort estimate.
    estimated: Option<String>,
    /// User-defined attribute: comma-separated time map names.
    time_map: Option<String>,
    #[serde(default)]
    urgency: f64,
}

pub async fn load(source: &TaskSource) -> Result<Vec<Task>> {
    let json = match source {
        TaskSource::Taskwarrior => {
            let output = Command::new("task")
                .arg("export")
                .output()
                .await
                .context("Failed to run `task export`. Is Taskwarrior installed?")?;
            if !output.status.success() {
                anyhow::bail!(
                    "`task export` failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            String::from_utf8(output.stdout).context("`task export` printed invalid UTF-8")?
        }
        TaskSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read tasks from {}", path.display()))?,
        TaskSource::Stdin => {
            let mut json = String::new();
            tokio::io::stdin()
                .read_to_string(&mut json)
                .await
                .context("Failed to read tasks from stdin")?;
            json
        }
    };

    parse_export(&json)
}

/// Parse export JSON into tasks, keeping pending tasks that carry an estimate.
pub fn parse_export(json: &str) -> Result<Vec<Task>> {
    let records: Vec<ExportedTask> =
        serde_json::from_str(json).context("Task export is not valid JSON")?;

    let mut tasks = Vec::new();
    for record in records {
        if SKIPPED_STATUS.contains(&record.status.as_str()) {
            continue;
        }
        let id = task_id(&record);
        let Some(estimated) = record.estimated.as_deref() else {
            debug!(task = %id, "no estimate, skipping");
            continue;
        };
        let Some(estimated) = parse_estimate(estimated) else {
            warn!(task = %id, estimated, "unreadable estimate, skipping");
            continue;
        };

        tasks.push(Task {
            deadline: parse_tw_date(record.due.as_deref(), "due", &id)?,
            not_before: parse_tw_date(record.wait.as_deref(), "wait", &id)?,
            description: record.description,
            estimated,
            urgency: record.urgency,
            time_maps: time_map_names(record.time_map.as_deref()),
            id,
        });
    }
    Ok(tasks)
}

/// The working-set id when the task has one, else the short uuid.
fn task_id(record: &ExportedTask) -> String {
    if record.id > 0 {
        record.id.to_string()
    } else {
        record.uuid.chars().take(8).collect()
    }
}

fn time_map_names(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// ISO 8601 duration such as `PT2H` or `P1DT4H`. The form without `T` before
/// the time part (`P2H`, `P1D4H`) is accepted too.
pub fn parse_estimate(value: &str) -> Option<Duration> {
    let value = value.trim();
    let rest = value.strip_prefix('P')?;

    // iso8601 stops at `D` and ignores a trailing time part without `T`.
    let normalized = if rest.contains('T') {
        value.to_string()
    } else {
        match rest.split_once('D') {
            Some((days, "")) => format!("P{days}D"),
            Some((days, time)) => format!("P{days}DT{time}"),
            None if rest.ends_with('W') => value.to_string(),
            None => format!("PT{rest}"),
        }
    };
    let parsed = iso8601::duration(&normalized).ok()?;

    let std_duration: std::time::Duration = parsed.into();
    Duration::from_std(std_duration).ok()
}

fn parse_tw_date(value: Option<&str>, field: &str, task: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            NaiveDateTime::parse_from_str(v, TW_DATE_FORMAT)
                .map(|naive| naive.and_utc())
                .with_context(|| format!("Task {task} has an invalid {field} date '{v}'"))
        })
        .transpose()
}
