//! Parallel execution of metric providers for one exposure.
//!
//! Every applicable provider is one work unit. Units fan out over a rayon
//! pool sized once per exposure; workers share nothing, and the calling
//! thread merges their tables. A provider that fails or panics is recorded
//! in the [`RunReport`] and left out of the merge.

mod report;


use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use nightqa_core::config::WorkerConfig;
use nightqa_core::{EntityTable, Granularity};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::error::ComputeError;
use crate::merge::merge_tables;
use crate::provider::{default_providers, MetricProvider, ProviderContext, ProviderError};
use crate::registry::ColumnRegistry;

pub use report::{ProviderOutcome, ProviderRun, RunReport};

/// Result of running providers over one exposure.
#[derive(Debug, Clone)]
pub enum MetricOutcome {
    /// No provider produced a table: the required products are missing.
    NoData { report: RunReport },
    /// One merged table per granularity.
    Tables {
        tables: BTreeMap<Granularity, EntityTable>,
        report: RunReport,
    },
}

impl MetricOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            MetricOutcome::NoData { report } | MetricOutcome::Tables { report, .. } => report,
        }
    }
}

/// Worker count for `queued` units: `min(queued, cores)`, further capped
/// when not running inside a batch allocation.
pub fn pool_size(config: &WorkerConfig, queued: usize) -> usize {
    let mut size = queued.min(config.available_cores());
    if !config.in_batch_allocation() {
        size = size.min(config.interactive_cap.max(1));
    }
    size.max(1)
}

pub struct MetricRunner {
    providers: Vec<Arc<dyn MetricProvider>>,
    workers: WorkerConfig,
    registry: Option<ColumnRegistry>,
    only: Option<BTreeSet<String>>,
}

impl MetricRunner {
    /// Runner over the full provider set.
    pub fn new(workers: WorkerConfig) -> Self {
        Self::with_providers(default_providers(), workers)
    }

    pub fn with_providers(providers: Vec<Arc<dyn MetricProvider>>, workers: WorkerConfig) -> Self {
        Self {
            providers,
            workers,
            registry: None,
            only: None,
        }
    }

    /// Record observed metric columns in `registry` after every run.
    pub fn with_registry(mut self, registry: ColumnRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Restrict execution to the named providers.
    pub fn with_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            if !self.providers.iter().any(|p| p.name() == name) {
                warn!(provider = %name, "unknown provider in filter");
            }
        }
        self.only = Some(names);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn MetricProvider>] {
        &self.providers
    }

    /// Run every applicable provider, then merge their tables.
    pub fn run(&self, ctx: &ProviderContext) -> Result<MetricOutcome, ComputeError> {
        if !ctx.input_dir().is_dir() {
            return Err(ComputeError::MissingInput(ctx.input_dir().to_path_buf()));
        }

        let started_at = Utc::now();
        let kind = ctx.exposure.observation_kind();
        let mut runs = Vec::new();
        let mut queued = Vec::new();
        for provider in &self.providers {
            let selected = self.only.as_ref().map_or(true, |only| only.contains(provider.name()));
            if selected && provider.applicable(&kind) {
                queued.push(Arc::clone(provider));
            } else {
                runs.push((
                    provider.name().to_string(),
                    ProviderRun::new(
                        provider.name(),
                        provider.granularity(),
                        ProviderOutcome::NotApplicable,
                        Default::default(),
                    ),
                    None,
                ));
            }
        }

        let workers = pool_size(&self.workers, queued.len());
        info!(
            night = ctx.exposure.id.night,
            expid = ctx.exposure.id.expid,
            kind = %kind,
            providers = queued.len(),
            workers,
            "computing metrics"
        );

        let results: Vec<(ProviderRun, Option<EntityTable>)> = if workers <= 1 {
            queued.iter().map(|p| execute(p.as_ref(), ctx)).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| ComputeError::Pool(e.to_string()))?;
            pool.install(|| queued.par_iter().map(|p| execute(p.as_ref(), ctx)).collect())
        };
        for (run, table) in results {
            runs.push((run.provider.clone(), run, table));
        }

        // Report and merge in registration order regardless of completion order.
        let order: BTreeMap<&str, usize> = self
            .providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name(), i))
            .collect();
        runs.sort_by_key(|(name, _, _)| order.get(name.as_str()).copied().unwrap_or(usize::MAX));

        let mut tables = Vec::new();
        let mut provider_runs = Vec::new();
        for (_, run, table) in runs {
            provider_runs.push(run);
            tables.extend(table);
        }
        let report = RunReport {
            observation_kind: kind,
            started_at,
            workers,
            providers: provider_runs,
        };

        if tables.is_empty() {
            warn!(
                night = ctx.exposure.id.night,
                expid = ctx.exposure.id.expid,
                "no provider produced a table"
            );
            return Ok(MetricOutcome::NoData { report });
        }

        let merged = merge_tables(tables)?;
        if let Some(registry) = &self.registry {
            if let Err(e) = registry.observe(merged.values()) {
                warn!(path = %registry.path().display(), error = %e, "failed to update metric column registry");
            }
        }
        Ok(MetricOutcome::Tables { tables: merged, report })
    }
}

/// Run one provider with panic isolation.
fn execute(provider: &dyn MetricProvider, ctx: &ProviderContext) -> (ProviderRun, Option<EntityTable>) {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| provider.compute(ctx)))
        .unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(payload.as_ref()))));
    let duration = start.elapsed();

    let (outcome, table) = match result {
        Ok(Some(table)) if !table.is_empty() => {
            debug!(provider = provider.name(), rows = table.len(), ?duration, "provider completed");
            (ProviderOutcome::Computed { rows: table.len() }, Some(table))
        }
        Ok(_) => {
            debug!(provider = provider.name(), "provider found no input products");
            (ProviderOutcome::Empty, None)
        }
        Err(e) => {
            error!(provider = provider.name(), error = %e, "provider failed");
            (ProviderOutcome::Failed { error: e.to_string() }, None)
        }
    };
    (ProviderRun::new(provider.name(), provider.granularity(), outcome, duration), table)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
