use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::exposure::{parse_eight_digits, ExposureId, Night};
use crate::layout::{OutputLayout, RawLayout};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Process-wide configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub paths: PathsConfig,
    pub workers: WorkerConfig,
    pub monitor: MonitorConfig,
    pub external: ExternalConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NIGHTQA_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NIGHTQA_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let paths = PathsConfig::from_env_profiled(p);
        let monitor = MonitorConfig::from_env_profiled(p, &paths);
        Self {
            profile: p.to_string(),
            workers: WorkerConfig::from_env_profiled(p),
            external: ExternalConfig::from_env_profiled(p),
            paths,
            monitor,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn raw_layout(&self) -> RawLayout {
        RawLayout::new(&self.paths.raw_dir)
    }

    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::new(&self.paths.output_dir, &self.paths.output_kind)
    }

    /// Intermediate products for one exposure: `{redux}/{night}/{expid:08}`.
    pub fn input_dir(&self, id: ExposureId) -> PathBuf {
        self.paths.redux_dir.join(id.night_dir()).join(id.expid_dir())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  raw:         {}", self.paths.raw_dir.display());
        tracing::info!("  redux:       {}", self.paths.redux_dir.display());
        tracing::info!("  output:      {} (kind={})", self.paths.output_dir.display(), self.paths.output_kind);
        tracing::info!("  thresholds:  {}", self.paths.threshold_dir.display());
        tracing::info!(
            "  calibration: {}",
            self.paths
                .calibration_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(disabled)".to_string())
        );
        tracing::info!(
            "  workers:     {} (interactive cap {}, batch env {})",
            self.workers.workers,
            self.workers.interactive_cap,
            self.workers.batch_env
        );
        tracing::info!("  monitor:     poll={}s, start_night={:?}", self.monitor.poll_seconds, self.monitor.start_night);
        tracing::info!(
            "  external:    process_cmd={}",
            self.external.process_command.as_deref().unwrap_or("(none)")
        );
    }
}

// ── Paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw data tree, `{night}/{expid}/`.
    pub raw_dir: PathBuf,
    /// Intermediate per-camera products from the external processing step.
    pub redux_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `{outputKind}` in artifact file names.
    pub output_kind: String,
    pub threshold_dir: PathBuf,
    /// Calibration standards; `None` disables drift correction.
    pub calibration_dir: Option<PathBuf>,
    pub calibration_family: String,
}

impl PathsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            raw_dir: PathBuf::from(profiled_env_or(p, "RAW_DIR", "data/raw")),
            redux_dir: PathBuf::from(profiled_env_or(p, "REDUX_DIR", "data/redux")),
            output_dir: PathBuf::from(profiled_env_or(p, "QA_OUTPUT_DIR", "data/qa")),
            output_kind: profiled_env_or(p, "QA_OUTPUT_KIND", "qa"),
            threshold_dir: PathBuf::from(profiled_env_or(p, "QA_THRESHOLD_DIR", "data/thresholds")),
            calibration_dir: profiled_env_opt(p, "QA_CALIB_DIR").map(PathBuf::from),
            calibration_family: profiled_env_or(p, "QA_CALIB_FAMILY", "calibration"),
        }
    }
}

// ── Worker pool ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of metric workers. 0 = available cores.
    pub workers: usize,
    /// Worker cap applied when not inside a batch-scheduler allocation.
    pub interactive_cap: usize,
    /// Env var whose presence marks a batch-scheduler allocation.
    pub batch_env: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            interactive_cap: 8,
            batch_env: "SLURM_JOB_ID".to_string(),
        }
    }
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            workers: profiled_env_usize(p, "QA_WORKERS", defaults.workers),
            interactive_cap: profiled_env_usize(p, "QA_INTERACTIVE_CAP", defaults.interactive_cap),
            batch_env: profiled_env_or(p, "QA_BATCH_ENV", &defaults.batch_env),
        }
    }

    /// Whether this process runs inside a dedicated batch allocation.
    pub fn in_batch_allocation(&self) -> bool {
        env_opt(&self.batch_env).is_some()
    }

    /// Core estimate before any per-batch sizing (0 means available parallelism).
    pub fn available_cores(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.workers
        }
    }
}

// ── Monitor loop ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between discovery passes that found nothing.
    pub poll_seconds: u64,
    /// Earliest night considered by discovery.
    pub start_night: Option<Night>,
    /// Creating this file stops the loop at the next iteration.
    pub stop_file: PathBuf,
}

impl MonitorConfig {
    fn from_env_profiled(p: &str, paths: &PathsConfig) -> Self {
        Self {
            poll_seconds: profiled_env_u64(p, "QA_POLL_SECONDS", 10),
            start_night: profiled_env_opt(p, "QA_START_NIGHT").and_then(|v| parse_eight_digits(&v)),
            stop_file: profiled_env_opt(p, "QA_STOP_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| paths.output_dir.join("STOP")),
        }
    }
}

// ── External collaborators ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    /// Instrument-processing command template (`{night}`, `{expid}`, `{rawdir}`, `{indir}`).
    pub process_command: Option<String>,
    /// Batch submission prefix; the job command line is appended.
    pub submit_command: String,
}

impl ExternalConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            process_command: profiled_env_opt(p, "QA_PROCESS_CMD"),
            submit_command: profiled_env_or(p, "QA_SUBMIT_CMD", "sbatch --wrap"),
        }
    }
}
