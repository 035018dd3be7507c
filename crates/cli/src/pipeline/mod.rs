//! Per-exposure orchestration: read metadata, run the processing step,
//! compute and merge metrics, evaluate status, persist.

mod error;
mod monitor;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nightqa_compute::{drift_metrics, ColumnRegistry, MetricOutcome, MetricRunner, ProviderContext};
use nightqa_core::{Config, Exposure, ExposureId, RawLayout, Severity};
use nightqa_ingest::read_exposure;
use nightqa_rules::{ExposureStatus, StatusEvaluator};
use nightqa_storage::{QaManifest, QaStore};
use tracing::{info, warn};

use crate::external::ExternalProcessor;

pub use error::PipelineError;
pub use monitor::{LoopOptions, LoopSummary};

/// Outcome of processing one exposure end to end.
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub exposure: ExposureId,
    pub status: Severity,
    pub tables: usize,
    pub failed_providers: Vec<String>,
    pub warnings: usize,
}

pub struct Pipeline {
    config: Config,
    raw: RawLayout,
    store: QaStore,
    runner: MetricRunner,
    evaluator: StatusEvaluator,
    external: ExternalProcessor,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        let layout = config.output_layout();
        let runner = MetricRunner::new(config.workers.clone())
            .with_registry(ColumnRegistry::new(layout.column_registry_path()));
        Self::with_runner(config, runner)
    }

    /// Pipeline over a custom provider set.
    pub fn with_runner(config: &Config, runner: MetricRunner) -> Self {
        let evaluator = StatusEvaluator::from_config(config).with_drift_metrics(drift_metrics(runner.providers()));
        Self {
            config: config.clone(),
            raw: config.raw_layout(),
            store: QaStore::new(config.output_layout()),
            runner,
            evaluator,
            external: ExternalProcessor::new(config.external.clone(), config.raw_layout()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restrict metric computation to the named providers.
    pub fn with_only(mut self, names: &[String]) -> Self {
        if !names.is_empty() {
            self.runner = self.runner.with_only(names.iter().cloned());
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &QaStore {
        &self.store
    }

    /// Setting this flag stops the monitor loop at its next iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.config.monitor.stop_file.exists()
    }

    fn input_dir(&self, id: ExposureId) -> PathBuf {
        self.config.input_dir(id)
    }

    /// Read metadata, run the processing step, then every provider.
    fn compute(&self, id: ExposureId) -> Result<(Exposure, MetricOutcome), PipelineError> {
        let exposure = read_exposure(&self.raw, id)?;
        let indir = self.input_dir(id);
        self.external.prepare(id, &indir)?;
        let outcome = self.runner.run(&ProviderContext::new(exposure.clone(), indir))?;
        for failed in outcome.report().failures() {
            warn!(night = id.night, expid = id.expid, provider = %failed.provider, "provider failed; table omitted");
        }
        Ok((exposure, outcome))
    }

    /// Process one exposure: metrics, status report, then the manifest.
    ///
    /// The manifest is written last, so any failure leaves the exposure
    /// eligible for a later retry.
    pub fn process_exposure(&self, id: ExposureId) -> Result<ProcessSummary, PipelineError> {
        let (exposure, outcome) = self.compute(id)?;
        let MetricOutcome::Tables { tables, report } = outcome else {
            return Err(PipelineError::NoData(id));
        };

        let status = self.evaluator.evaluate(&exposure, &tables)?;
        self.store.write_status(&status)?;
        let manifest = self.store.persist(&exposure, &tables, &report)?;

        let summary = ProcessSummary {
            exposure: id,
            status: status.status,
            tables: manifest.tables.len(),
            failed_providers: report.failures().map(|r| r.provider.clone()).collect(),
            warnings: status.warnings.len(),
        };
        info!(
            night = id.night,
            expid = id.expid,
            status = %summary.status,
            tables = summary.tables,
            failed = summary.failed_providers.len(),
            "exposure processed"
        );
        Ok(summary)
    }

    /// Compute and persist metric tables without evaluating status.
    pub fn compute_metrics(&self, id: ExposureId) -> Result<QaManifest, PipelineError> {
        let (exposure, outcome) = self.compute(id)?;
        match outcome {
            MetricOutcome::Tables { tables, report } => Ok(self.store.persist(&exposure, &tables, &report)?),
            MetricOutcome::NoData { .. } => Err(PipelineError::NoData(id)),
        }
    }

    /// Re-evaluate status from previously persisted tables.
    pub fn evaluate_existing(&self, id: ExposureId) -> Result<ExposureStatus, PipelineError> {
        let exposure = read_exposure(&self.raw, id)?;
        let tables = self.store.load_tables(id)?;
        let status = self.evaluator.evaluate(&exposure, &tables)?;
        self.store.write_status(&status)?;
        Ok(status)
    }
}
