//! Error types for snapshot resolution.

use std::path::PathBuf;

/// Errors that can occur while listing or loading snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON payload could not be parsed.
    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// YAML payload could not be parsed.
    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// The family has no snapshot files at all. Never recovered from.
    #[error("no snapshot files for family '{family}' in {dir}")]
    NoSnapshots { family: String, dir: PathBuf },

    /// A sub-key (program, metric) is absent from a resolved snapshot.
    #[error("snapshot {path} has no entry for '{key}'")]
    MissingKey { path: PathBuf, key: String },

    /// Payload parsed but violates an invariant (e.g. unordered band edges).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SnapshotError {
    /// Whether this error must abort evaluation rather than skip one metric.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SnapshotError::NoSnapshots { .. })
    }
}

/// Result alias for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
