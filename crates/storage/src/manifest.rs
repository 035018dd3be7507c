//! The exposure manifest: the completion artifact for one exposure.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nightqa_compute::RunReport;
use nightqa_core::{ExposureId, Granularity};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// One persisted granularity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub granularity: Granularity,
    /// File name relative to the exposure output directory.
    pub file: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaManifest {
    pub exposure: ExposureId,
    pub observation_kind: String,
    pub program: Option<String>,
    pub tables: Vec<TableEntry>,
    pub run: RunReport,
    pub written_at: DateTime<Utc>,
}

impl QaManifest {
    pub fn table(&self, granularity: Granularity) -> Option<&TableEntry> {
        self.tables.iter().find(|t| t.granularity == granularity)
    }
}

/// Write `value` as pretty JSON through a temp file and rename, so readers
/// never observe a partial file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&contents).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
