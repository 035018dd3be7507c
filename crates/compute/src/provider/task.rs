use std::path::{Path, PathBuf};

use nightqa_core::{EntityTable, Exposure, Granularity, QaError};

/// Error type for one provider's computation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing input: {0}")]
    MissingInput(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed product {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid product: {0}")]
    Invalid(String),
    #[error("Table error: {0}")]
    Table(#[from] QaError),
    #[error("Provider panicked: {0}")]
    Panicked(String),
}

/// Immutable inputs handed to every provider for one exposure.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub exposure: Exposure,
    /// Directory of intermediate per-camera products for this exposure.
    pub input_dir: PathBuf,
}

impl ProviderContext {
    pub fn new(exposure: Exposure, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            exposure,
            input_dir: input_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }
}

/// A metric computation over one exposure's intermediate products.
///
/// Implementations are share-nothing: they read from the context and
/// return a fresh table. `Ok(None)` means the products this provider
/// needs are absent for this exposure.
pub trait MetricProvider: Send + Sync {
    /// Stable name used in logs, `--only` filters and the run report.
    fn name(&self) -> &str;

    /// Granularity of the table this provider returns.
    fn granularity(&self) -> Granularity;

    /// Whether the provider runs for this observation kind (`ARC`, `SCIENCE`, ...).
    fn applicable(&self, observation_kind: &str) -> bool;

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError>;

    /// Metric columns that must be drift-corrected before classification.
    fn drift_metrics(&self) -> &'static [&'static str] {
        &[]
    }
}
