use anyhow::Result;
use owo_colors::OwoColorize;

use super::{Plan, RunOptions};
use crate::render::{Render, TaskLine};

pub async fn run(options: &RunOptions) -> Result<()> {
    let plan = Plan::load(options).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&plan.allocations)?);
        return Ok(());
    }

    for failure in &plan.failures {
        eprintln!("{}", failure.render());
    }

    if plan.allocations.is_empty() {
        println!("{}", "No pending tasks with an estimate.".dimmed());
        return Ok(());
    }

    for result in &plan.allocations {
        let line = TaskLine {
            task: plan.task(&result.task_id),
            result,
        };
        println!("{}", line.render());
    }

    Ok(())
}
