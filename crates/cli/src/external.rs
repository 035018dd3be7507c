//! External collaborators: the instrument-processing step that writes the
//! intermediate products, and batch-scheduler submission.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use nightqa_core::config::ExternalConfig;
use nightqa_core::{Config, ExposureId, RawLayout};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Fill `{night}`, `{expid}`, `{rawdir}` and `{indir}` in a command template.
pub fn render_template(template: &str, id: ExposureId, rawdir: &Path, indir: &Path) -> String {
    template
        .replace("{night}", &id.night_dir())
        .replace("{expid}", &id.expid.to_string())
        .replace("{rawdir}", &rawdir.display().to_string())
        .replace("{indir}", &indir.display().to_string())
}

/// Split a rendered command on whitespace into program and arguments.
fn command_from(line: &str) -> Result<Command, ExternalError> {
    let mut parts = line.split_whitespace();
    let program = parts.next().ok_or(ExternalError::EmptyCommand)?;
    let mut command = Command::new(program);
    command.args(parts);
    Ok(command)
}

#[derive(Debug, Clone)]
pub struct ExternalProcessor {
    config: ExternalConfig,
    raw: RawLayout,
}

impl ExternalProcessor {
    pub fn new(config: ExternalConfig, raw: RawLayout) -> Self {
        Self { config, raw }
    }

    /// Run the processing command for one exposure and wait for it.
    ///
    /// Without a configured command the products are assumed present.
    pub fn prepare(&self, id: ExposureId, indir: &Path) -> Result<(), ExternalError> {
        let Some(template) = &self.config.process_command else {
            debug!(night = id.night, expid = id.expid, "no processing command; using existing products");
            return Ok(());
        };
        let line = render_template(template, id, &self.raw.exposure_dir(id), indir);
        info!(night = id.night, expid = id.expid, command = %line, "running processing step");

        let status = command_from(&line)?
            .status()
            .map_err(|source| ExternalError::Spawn {
                program: line.split_whitespace().next().unwrap_or_default().to_string(),
                source,
            })?;
        if !status.success() {
            return Err(ExternalError::Failed { command: line, status });
        }
        Ok(())
    }

    /// Hand `job` to the batch scheduler. Returns once the scheduler has
    /// accepted it; the job's own completion is never awaited.
    pub fn submit(&self, id: ExposureId, job: &[String]) -> Result<(), ExternalError> {
        let mut command = command_from(&self.config.submit_command)?;
        command.arg(job.join(" "));
        let output = command.output().map_err(|source| ExternalError::Spawn {
            program: self.config.submit_command.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ExternalError::Failed {
                command: self.config.submit_command.clone(),
                status: output.status,
            });
        }
        info!(
            night = id.night,
            expid = id.expid,
            response = %String::from_utf8_lossy(&output.stdout).trim(),
            "submitted batch job"
        );
        Ok(())
    }
}

/// Command line that processes one exposure in a separate job.
///
/// The job sees the same directories, worker count and profile as the
/// process that submitted it.
pub fn run_job_command(config: &Config, id: ExposureId) -> Vec<String> {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("nightqa"));
    let mut job = Vec::new();
    if !config.profile.is_empty() {
        job.push("env".to_string());
        job.push(format!("NIGHTQA_PROFILE={}", config.profile));
    }
    job.push(exe.display().to_string());
    for (flag, value) in [
        ("--rawdir", config.paths.raw_dir.display().to_string()),
        ("--indir", config.paths.redux_dir.display().to_string()),
        ("--outdir", config.paths.output_dir.display().to_string()),
        ("--workers", config.workers.workers.to_string()),
    ] {
        job.push(flag.to_string());
        job.push(value);
    }
    job.extend([
        "run".to_string(),
        "--night".to_string(),
        id.night_dir(),
        "--expid".to_string(),
        id.expid.to_string(),
    ]);
    job
}
