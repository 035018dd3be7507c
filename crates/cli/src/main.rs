mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use nightqa_cli::{LoopOptions, Pipeline};
use nightqa_core::Config;
use nightqa_ingest::ProcessedSet;

use crate::cli::{Cli, Command};

/// Environment first, then command-line overrides; logged once.
fn load_config(cli: &Cli) -> Config {
    nightqa_core::config::load_dotenv();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.log_summary();
    config
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command {
        Command::Run { exposure, only } => {
            let id = exposure.id();
            let summary = Pipeline::new(&config)
                .with_only(&only)
                .process_exposure(id)
                .with_context(|| format!("failed to process exposure {}", id))?;
            println!("{} {}", id, summary.status);
        }
        Command::Monitor {
            mode,
            batch,
            max_idle_polls,
            ..
        } => {
            let options = LoopOptions {
                mode,
                batch,
                poll: Duration::from_secs(config.monitor.poll_seconds),
                max_idle_polls,
            };
            let pipeline = Pipeline::new(&config);
            let mut processed = ProcessedSet::new();
            let summary = pipeline.run_loop(&options, &mut processed);
            info!(?summary, "monitor exited");
        }
        Command::Metrics { exposure, only } => {
            let id = exposure.id();
            let manifest = Pipeline::new(&config)
                .with_only(&only)
                .compute_metrics(id)
                .with_context(|| format!("failed to compute metrics for {}", id))?;
            for table in &manifest.tables {
                println!("{} {} rows={}", id, table.file, table.rows);
            }
        }
        Command::Status { exposure } => {
            let id = exposure.id();
            let status = Pipeline::new(&config)
                .evaluate_existing(id)
                .with_context(|| format!("failed to evaluate status for {}", id))?;
            println!("{} {}", id, status.status);
            for (granularity, table) in &status.tables {
                println!("  {} {} ({} rows)", granularity, table.status, table.rows.len());
            }
            for warning in &status.warnings {
                println!("  warning: {}", warning);
            }
        }
    }
    Ok(())
}
