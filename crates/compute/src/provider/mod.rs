//! Metric providers: the closed, explicitly registered set of per-exposure
//! metric computations.
//!
//! Each provider declares the granularity of the table it returns and the
//! observation kinds it applies to. Providers never see each other's output;
//! the runner merges their tables afterwards.

pub mod products;
pub mod providers;
pub mod task;

use std::sync::Arc;

pub use providers::{
    AmpStatsProvider, CalibIntegralsProvider, ExposureSummaryProvider, FiberFluxProvider, FiberSkyProvider,
    SpectroCoverageProvider, TraceShiftProvider,
};
pub use task::{MetricProvider, ProviderContext, ProviderError};

/// Every provider, in execution and column order.
pub fn default_providers() -> Vec<Arc<dyn MetricProvider>> {
    vec![
        Arc::new(AmpStatsProvider),
        Arc::new(TraceShiftProvider),
        Arc::new(CalibIntegralsProvider),
        Arc::new(FiberFluxProvider),
        Arc::new(FiberSkyProvider),
        Arc::new(SpectroCoverageProvider),
        Arc::new(ExposureSummaryProvider),
    ]
}

/// Drift-corrected metric columns declared by a set of providers.
pub fn drift_metrics(providers: &[Arc<dyn MetricProvider>]) -> Vec<String> {
    providers
        .iter()
        .flat_map(|p| p.drift_metrics().iter().map(|m| m.to_string()))
        .collect()
}
