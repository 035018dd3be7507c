//! Metric computation: providers, the parallel runner, table merging and
//! the metric-column registry.

pub mod error;
pub mod merge;
pub mod provider;
pub mod registry;
pub mod runner;

pub use error::ComputeError;
pub use merge::{merge_tables, outer_join};
pub use provider::{default_providers, drift_metrics, MetricProvider, ProviderContext, ProviderError};
pub use registry::ColumnRegistry;
pub use runner::{pool_size, MetricOutcome, MetricRunner, ProviderOutcome, ProviderRun, RunReport};
