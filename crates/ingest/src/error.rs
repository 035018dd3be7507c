use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The raw exposure directory or its request file is absent.
    #[error("missing input: {0}")]
    MissingInput(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid request file {path}: {source}")]
    Request {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("request file {0} is not a JSON object")]
    NotAnObject(PathBuf),
}
