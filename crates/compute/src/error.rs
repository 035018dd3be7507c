use std::path::PathBuf;

use nightqa_core::QaError;

/// Errors that stop metric computation for a whole exposure.
///
/// A single provider failing is not one of these; it is recorded as a
/// [`ProviderError`](crate::provider::ProviderError) in the run report.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The exposure's intermediate-product directory does not exist.
    #[error("Missing input: {0}")]
    MissingInput(PathBuf),

    #[error("Table error: {0}")]
    Table(#[from] QaError),

    #[error("Column registry {path}: {source}")]
    Registry {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Column registry {path} is not valid JSON: {source}")]
    RegistryFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Worker pool: {0}")]
    Pool(String),
}
