//! Core [`SnapshotStore`]: filesystem-backed, date-versioned snapshot lookup.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{Result, SnapshotError};

/// One snapshot file on disk, identified by its family and effective date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub family: String,
    pub effective: NaiveDate,
    pub path: PathBuf,
}

/// A loaded snapshot payload.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub file: SnapshotFile,
    pub payload: T,
}

/// Outcome of resolving `(family, date)`.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub snapshot: Snapshot<T>,
    /// True when the target date precedes every snapshot and the earliest
    /// one was returned instead.
    pub stale: bool,
}

/// Parse `{family}-{YYYYMMDD}.{ext}` into `(family, effective date)`.
///
/// The family may itself contain `-`; the date is the part after the last one.
/// Only `json`, `yaml` and `yml` extensions are recognized.
pub fn parse_snapshot_name(file_name: &str) -> Option<(String, NaiveDate)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !matches!(ext, "json" | "yaml" | "yml") {
        return None;
    }
    let (family, date) = stem.rsplit_once('-')?;
    if family.is_empty() || date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let effective = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    Some((family.to_string(), effective))
}

/// Pick the snapshot in effect on `date` from one family's files.
///
/// Returns the file with the greatest effective date `<= date`, or the
/// globally earliest file (flagged stale) when none qualifies. `None` only
/// for an empty input.
pub fn select_snapshot(mut files: Vec<SnapshotFile>, date: NaiveDate) -> Option<(SnapshotFile, bool)> {
    // Newest first; path breaks ties so selection is deterministic.
    files.sort_by(|a, b| b.effective.cmp(&a.effective).then_with(|| a.path.cmp(&b.path)));

    if let Some(pos) = files.iter().position(|f| f.effective <= date) {
        return Some((files.swap_remove(pos), false));
    }
    let earliest = files.iter().map(|f| f.effective).min()?;
    let pos = files.iter().position(|f| f.effective == earliest)?;
    Some((files.swap_remove(pos), true))
}

/// Filesystem-backed snapshot store for one directory.
///
/// Every call re-reads the directory; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List every well-named snapshot file in the directory.
    ///
    /// A missing directory yields an empty list; callers asking for a
    /// specific family then get [`SnapshotError::NoSnapshots`].
    pub fn scan(&self) -> Result<Vec<SnapshotFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.dir.display(), "snapshot directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match parse_snapshot_name(name) {
                Some((family, effective)) => files.push(SnapshotFile {
                    family,
                    effective,
                    path,
                }),
                None => debug!(path = %path.display(), "skipping file with unrecognized snapshot name"),
            }
        }
        Ok(files)
    }

    /// Names of all families that have at least one snapshot.
    pub fn families(&self) -> Result<BTreeSet<String>> {
        Ok(self.scan()?.into_iter().map(|f| f.family).collect())
    }

    /// All snapshots of one family, newest first.
    pub fn list(&self, family: &str) -> Result<Vec<SnapshotFile>> {
        let mut files: Vec<SnapshotFile> = self
            .scan()?
            .into_iter()
            .filter(|f| f.family == family)
            .collect();
        files.sort_by(|a, b| b.effective.cmp(&a.effective).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }

    /// Select the snapshot file in effect for `(family, date)` without loading it.
    pub fn select(&self, family: &str, date: NaiveDate) -> Result<(SnapshotFile, bool)> {
        let files = self.list(family)?;
        select_snapshot(files, date).ok_or_else(|| SnapshotError::NoSnapshots {
            family: family.to_string(),
            dir: self.dir.clone(),
        })
    }

    /// Resolve and load the snapshot in effect for `(family, date)`.
    pub fn resolve<T: DeserializeOwned>(&self, family: &str, date: NaiveDate) -> Result<Resolved<T>> {
        let (file, stale) = self.select(family, date)?;
        if stale {
            warn!(
                family = %family,
                target = %date,
                effective = %file.effective,
                "no snapshot effective on target date; falling back to earliest snapshot"
            );
        } else {
            debug!(family = %family, target = %date, effective = %file.effective, "resolved snapshot");
        }
        let snapshot = self.load(file)?;
        Ok(Resolved { snapshot, stale })
    }

    /// Parse a snapshot file according to its extension.
    pub fn load<T: DeserializeOwned>(&self, file: SnapshotFile) -> Result<Snapshot<T>> {
        let contents = fs::read_to_string(&file.path)?;
        let is_json = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "json")
            .unwrap_or(false);

        let payload = if is_json {
            serde_json::from_str(&contents).map_err(|source| SnapshotError::Json {
                path: file.path.clone(),
                source,
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|source| SnapshotError::Yaml {
                path: file.path.clone(),
                source,
            })?
        };
        Ok(Snapshot { file, payload })
    }
}
