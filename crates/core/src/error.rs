use thiserror::Error;

use crate::table::Granularity;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Malformed exposure identity: {0}")]
    MalformedIdentity(String),

    #[error("{granularity} key expects {expected} columns, got {got}")]
    KeyArity {
        granularity: Granularity,
        expected: usize,
        got: usize,
    },

    #[error("Invalid value for key column {column}: {value}")]
    InvalidKey { column: String, value: String },

    #[error("Duplicate key {key} in {granularity} table")]
    DuplicateKey { granularity: Granularity, key: String },

    #[error("Column {0} is a key column and cannot hold metric values")]
    KeyColumnAsMetric(String),

    #[error("{0}")]
    Other(String),
}
