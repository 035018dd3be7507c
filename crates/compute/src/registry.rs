//! Append-only registry of every metric column ever observed, per
//! granularity. Downstream tools read it to populate metric menus.
//!
//! Several `nightqa run` jobs may update the same file at once, so every
//! load-merge-write cycle holds an exclusive lock on a sidecar `.lock` file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use fs4::fs_std::FileExt;
use nightqa_core::{EntityTable, Granularity};
use tracing::{debug, info};

use crate::error::ComputeError;

/// granularity name → sorted column names.
pub type ColumnSets = BTreeMap<String, BTreeSet<String>>;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Exclusive advisory lock, released when the handle is closed.
/// The lock file itself is left in place.
struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    path: PathBuf,
}

impl ColumnRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> ComputeError {
        ComputeError::Registry {
            path: self.path.clone(),
            source,
        }
    }

    /// Current contents; a missing file is an empty registry.
    pub fn load(&self) -> Result<ColumnSets, ComputeError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ColumnSets::new()),
            Err(source) => {
                return Err(ComputeError::Registry {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| ComputeError::RegistryFormat {
            path: self.path.clone(),
            source,
        })
    }

    /// Record the metric columns of `tables`.
    ///
    /// The file is rewritten only when at least one new name appears.
    /// Returns whether it was rewritten.
    pub fn observe<'a, I>(&self, tables: I) -> Result<bool, ComputeError>
    where
        I: IntoIterator<Item = &'a EntityTable>,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let _lock = RegistryLock::acquire(&self.lock_path()).map_err(|e| self.io_error(e))?;

        let mut sets = self.load()?;
        let mut added = Vec::new();
        for table in tables {
            let names = sets.entry(table.granularity().name().to_string()).or_default();
            for column in table.metric_columns() {
                if names.insert(column.clone()) {
                    added.push(format!("{}:{}", table.granularity(), column));
                }
            }
        }
        if added.is_empty() {
            debug!(path = %self.path.display(), "no new metric columns");
            return Ok(false);
        }

        self.write(&sets)?;
        info!(path = %self.path.display(), added = ?added, "metric column registry updated");
        Ok(true)
    }

    /// Columns registered for one granularity.
    pub fn columns(&self, granularity: Granularity) -> Result<BTreeSet<String>, ComputeError> {
        Ok(self.load()?.remove(granularity.name()).unwrap_or_default())
    }

    /// Caller holds the registry lock.
    fn write(&self, sets: &ColumnSets) -> Result<(), ComputeError> {
        let json = serde_json::to_string_pretty(sets).map_err(|source| ComputeError::RegistryFormat {
            path: self.path.clone(),
            source,
        })?;
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = self.path.with_file_name(name);
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}
