pub mod check;
pub mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;
use taskcheck_core::config::default_config_path;
use taskcheck_core::{
    Allocator, Availability, FeedCache, Horizon, Settings, SourceFailure, Task, TaskAllocation,
    collect_busy, free_intervals,
};

use crate::tasks::{self, TaskSource};
use crate::utils::tui::create_spinner;

/// Options shared by every command.
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub tasks: TaskSource,
    pub strict: bool,
    pub json: bool,
}

/// Everything a command needs, computed once per run.
pub struct Plan {
    pub today: NaiveDate,
    pub tasks: Vec<Task>,
    pub availability: Availability,
    pub allocations: Vec<TaskAllocation>,
    pub failures: Vec<SourceFailure>,
}

impl Plan {
    /// Load config, collect busy time, read tasks and allocate them.
    pub async fn load(options: &RunOptions) -> Result<Self> {
        let path = match &options.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        let settings = Settings::load(&path)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        let tz = run_timezone(&settings)?;
        let now = Utc::now().with_timezone(&tz);
        let today = now.date_naive();

        let cache = match &settings.cache_dir {
            Some(dir) => FeedCache::open(dir)?,
            None => FeedCache::open_default()?,
        };

        let strict = options.strict || settings.strict;
        let spinner = (!options.json && !settings.sources.is_empty())
            .then(|| create_spinner("Fetching calendars".to_string()));
        let collected = collect_busy(&cache, &settings.sources, today, tz, strict).await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let collected = collected.context("Failed to collect calendar events")?;

        let horizon = Horizon::ahead(today, settings.days_ahead);
        let availability = free_intervals(
            &settings.template,
            &settings.exceptions,
            &collected.busy,
            &horizon,
            tz,
        )
        .clip_before(now);
        debug!(
            free_min = availability.total_free().num_minutes(),
            days = availability.horizon().dates().count(),
            "availability computed"
        );

        let tasks = tasks::load(&options.tasks).await?;
        let allocations = Allocator::new(&tasks, &availability)
            .with_time_maps(&settings.time_maps)?
            .collect();

        Ok(Plan {
            today,
            tasks,
            availability,
            allocations,
            failures: collected.failures,
        })
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// The configured timezone, else the system one.
fn run_timezone(settings: &Settings) -> Result<Tz> {
    if let Some(tz) = settings.timezone {
        return Ok(tz);
    }
    let name = iana_time_zone::get_timezone()
        .context("Could not determine the system timezone; set `timezone` in taskcheck.toml")?;
    name.parse::<Tz>().map_err(|_| {
        anyhow::anyhow!("Unknown system timezone '{name}'; set `timezone` in taskcheck.toml")
    })
}
