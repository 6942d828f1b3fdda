use anyhow::Result;

use super::{Plan, RunOptions};
use crate::render::{Render, ReportView};
use crate::utils::date::resolve_until;

pub async fn run(options: &RunOptions, until: Option<&str>) -> Result<()> {
    let plan = Plan::load(options).await?;

    // Defaults to the end of the planning horizon.
    let until = match until {
        Some(expr) => resolve_until(expr, plan.today)?,
        None => plan.availability.horizon().end,
    };
    let report = taskcheck_core::render(&plan.allocations, &plan.availability, until);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for failure in &plan.failures {
        eprintln!("{}", failure.render());
    }

    let view = ReportView {
        report: &report,
        tasks: &plan.tasks,
    };
    println!("{}", view.render());

    Ok(())
}
