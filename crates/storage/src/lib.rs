//! Persistence of per-exposure QA outputs.
//!
//! Layout under `{base}/{night}/{expid:08}/`:
//! - one Parquet file per granularity table
//! - the manifest `{kind}-{expid:08}.json`, written last; its presence
//!   marks the exposure complete
//! - the status report `qastatus-{expid:08}.json`

pub mod error;
pub mod manifest;
pub mod parquet;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use nightqa_compute::RunReport;
use nightqa_core::{EntityTable, Exposure, ExposureId, Granularity, OutputLayout};
use nightqa_rules::ExposureStatus;
use tracing::{debug, info};

pub use error::StorageError;
pub use manifest::{QaManifest, TableEntry};
pub use crate::parquet::{read_table, write_table};

use manifest::{read_json, write_json_atomic};

/// Reads and writes QA outputs for one output kind.
#[derive(Debug, Clone)]
pub struct QaStore {
    layout: OutputLayout,
}

impl QaStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// True once the manifest for `id` exists.
    pub fn is_complete(&self, id: ExposureId) -> bool {
        self.layout.artifact_path(id).is_file()
    }

    /// Persist merged tables, then the manifest.
    ///
    /// Tables are written before the manifest, so an interrupted write leaves
    /// the exposure incomplete and eligible for retry.
    pub fn persist(
        &self,
        exposure: &Exposure,
        tables: &BTreeMap<Granularity, EntityTable>,
        run: &RunReport,
    ) -> Result<QaManifest, StorageError> {
        let id = exposure.id;
        let mut entries = Vec::with_capacity(tables.len());
        for (granularity, table) in tables {
            let path = self.layout.table_path(id, *granularity);
            write_table(table, &path, id)?;
            entries.push(TableEntry {
                granularity: *granularity,
                file: file_name(&path),
                rows: table.len(),
                columns: table.columns(),
            });
        }

        let manifest = QaManifest {
            exposure: id,
            observation_kind: exposure.observation_kind(),
            program: exposure.program.clone(),
            tables: entries,
            run: run.clone(),
            written_at: Utc::now(),
        };
        let artifact = self.layout.artifact_path(id);
        write_json_atomic(&artifact, &manifest)?;
        info!(
            night = id.night,
            expid = id.expid,
            tables = manifest.tables.len(),
            path = %artifact.display(),
            "exposure outputs persisted"
        );
        Ok(manifest)
    }

    pub fn read_manifest(&self, id: ExposureId) -> Result<QaManifest, StorageError> {
        read_json(&self.layout.artifact_path(id))
    }

    /// Load every table listed in the manifest.
    pub fn load_tables(&self, id: ExposureId) -> Result<BTreeMap<Granularity, EntityTable>, StorageError> {
        let manifest = self.read_manifest(id)?;
        let dir = self.layout.exposure_dir(id);
        let mut tables = BTreeMap::new();
        for entry in &manifest.tables {
            let table = read_table(&dir.join(&entry.file), Some(entry.granularity))?;
            debug!(granularity = %entry.granularity, rows = table.len(), "loaded table");
            tables.insert(entry.granularity, table);
        }
        Ok(tables)
    }

    pub fn write_status(&self, status: &ExposureStatus) -> Result<PathBuf, StorageError> {
        let path = self.layout.status_path(status.exposure);
        write_json_atomic(&path, status)?;
        info!(
            night = status.exposure.night,
            expid = status.exposure.expid,
            status = %status.status,
            path = %path.display(),
            "status report written"
        );
        Ok(path)
    }

    pub fn read_status(&self, id: ExposureId) -> Result<ExposureStatus, StorageError> {
        read_json(&self.layout.status_path(id))
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
