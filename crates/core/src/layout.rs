//! Filesystem path conventions for raw inputs, intermediate products and QA outputs.

use std::path::{Path, PathBuf};

use crate::exposure::{ExpId, ExposureId};
use crate::table::Granularity;

/// Name of the file whose presence marks a raw exposure as landed.
pub fn raw_marker_name(expid: ExpId) -> String {
    format!("desi-{:08}.fits.fz", expid)
}

/// Name of the raw observation request (metadata) file.
pub fn request_file_name(expid: ExpId) -> String {
    format!("request-{:08}.json", expid)
}

/// Raw tree: `{base}/{night}/{expid:08d}/`.
#[derive(Debug, Clone)]
pub struct RawLayout {
    base: PathBuf,
}

impl RawLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn night_dir(&self, night: u32) -> PathBuf {
        self.base.join(format!("{:08}", night))
    }

    pub fn exposure_dir(&self, id: ExposureId) -> PathBuf {
        self.base.join(id.night_dir()).join(id.expid_dir())
    }

    pub fn marker_path(&self, id: ExposureId) -> PathBuf {
        self.exposure_dir(id).join(raw_marker_name(id.expid))
    }

    pub fn request_path(&self, id: ExposureId) -> PathBuf {
        self.exposure_dir(id).join(request_file_name(id.expid))
    }
}

/// QA outputs: `{base}/{night}/{expid:08d}/{kind}-{expid:08d}.{ext}`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base: PathBuf,
    kind: String,
}

impl OutputLayout {
    pub fn new(base: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            kind: kind.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn exposure_dir(&self, id: ExposureId) -> PathBuf {
        self.base.join(id.night_dir()).join(id.expid_dir())
    }

    /// The completion artifact; its presence means the exposure is done.
    pub fn artifact_path(&self, id: ExposureId) -> PathBuf {
        self.exposure_dir(id)
            .join(format!("{}-{:08}.json", self.kind, id.expid))
    }

    pub fn table_path(&self, id: ExposureId, granularity: Granularity) -> PathBuf {
        self.exposure_dir(id).join(format!(
            "{}-{:08}-{}.parquet",
            self.kind,
            id.expid,
            granularity.name()
        ))
    }

    pub fn status_path(&self, id: ExposureId) -> PathBuf {
        self.exposure_dir(id)
            .join(format!("qastatus-{:08}.json", id.expid))
    }

    /// Installation-wide registry of observed metric columns.
    pub fn column_registry_path(&self) -> PathBuf {
        self.base.join("qa-metric-columns.json")
    }
}
