use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nightqa_core::exposure::parse_eight_digits;
use nightqa_core::{Config, ExposureId, Night};
use nightqa_ingest::DiscoveryMode;

/// Nightly exposure quality assurance.
///
/// Discovers landed exposures, computes per-entity QA metrics, classifies
/// them against dated threshold snapshots and writes one status per exposure.
#[derive(Parser, Debug)]
#[command(name = "nightqa", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub dirs: DirArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Fold command-line overrides into the environment-derived config.
    pub fn apply(&self, config: &mut Config) {
        self.dirs.apply(config);
        if let Command::Monitor {
            start_night: Some(night),
            ..
        } = &self.command
        {
            config.monitor.start_night = Some(*night);
        }
    }
}

/// Directory overrides; the environment supplies the defaults.
#[derive(Args, Debug)]
pub struct DirArgs {
    /// Raw data tree (`{night}/{expid}/`)
    #[arg(long, global = true)]
    pub rawdir: Option<PathBuf>,

    /// Intermediate products written by the processing step
    #[arg(long, global = true)]
    pub indir: Option<PathBuf>,

    /// QA output base directory
    #[arg(long, global = true)]
    pub outdir: Option<PathBuf>,

    /// Metric worker count (0 = available cores)
    #[arg(long, global = true)]
    pub workers: Option<usize>,
}

impl DirArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.rawdir {
            config.paths.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.indir {
            config.paths.redux_dir = dir.clone();
        }
        if let Some(dir) = &self.outdir {
            config.paths.output_dir = dir.clone();
        }
        if let Some(n) = self.workers {
            config.workers.workers = n;
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct ExposureArgs {
    /// Observing night, YYYYMMDD
    #[arg(long, value_parser = parse_night)]
    pub night: Night,

    /// Exposure id
    #[arg(long)]
    pub expid: u32,
}

impl ExposureArgs {
    pub fn id(&self) -> ExposureId {
        ExposureId::new(self.night, self.expid)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process one exposure: metrics, status report and manifest
    Run {
        #[command(flatten)]
        exposure: ExposureArgs,
        /// Only run these providers (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Poll for new exposures until stopped
    Monitor {
        /// catchup: oldest unprocessed first; live: most recent night only
        #[arg(long, env = "NIGHTQA_MODE", default_value = "catchup")]
        mode: DiscoveryMode,
        /// Ignore nights before this one, YYYYMMDD
        #[arg(long, value_parser = parse_night)]
        start_night: Option<Night>,
        /// Submit each exposure to the batch scheduler
        #[arg(long)]
        batch: bool,
        /// Exit after this many empty polls
        #[arg(long)]
        max_idle_polls: Option<usize>,
    },
    /// Compute and persist metric tables without evaluating status
    Metrics {
        #[command(flatten)]
        exposure: ExposureArgs,
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Re-evaluate status from persisted tables
    Status {
        #[command(flatten)]
        exposure: ExposureArgs,
    },
}

fn parse_night(s: &str) -> Result<Night, String> {
    parse_eight_digits(s).ok_or_else(|| format!("'{}' is not an 8-digit YYYYMMDD night", s))
}
