mod commands;
mod render;
mod tasks;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::RunOptions;
use tasks::TaskSource;

#[derive(Parser)]
#[command(name = "taskcheck")]
#[command(about = "Check whether your pending tasks fit in your working hours before they are due")]
struct Cli {
    /// Config file (defaults to <config dir>/task/taskcheck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read `task export` JSON from this file ("-" for stdin) instead of running `task`
    #[arg(long, global = true)]
    tasks: Option<String>,

    /// Fail when any calendar cannot be fetched or parsed
    #[arg(long, global = true)]
    strict: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every task against its due date (default)
    Check,
    /// Show the planned work day by day
    Report {
        /// Last day to show (YYYY-MM-DD, "3d", "next friday")
        #[arg(long)]
        until: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = RunOptions {
        config: cli.config,
        tasks: TaskSource::from_arg(cli.tasks.as_deref()),
        strict: cli.strict,
        json: cli.json,
    };

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => commands::check::run(&options).await,
        Commands::Report { until } => commands::report::run(&options, until.as_deref()).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("taskcheck=debug,taskcheck_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
