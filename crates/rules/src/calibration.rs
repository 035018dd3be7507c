//! Calibration reference standards for drift-corrected metrics.
//!
//! A calibration snapshot is keyed by observation program, then by metric
//! column. Each standard carries the linear drift model used to correct a
//! raw value for an environmental covariate, and per-entity nominal values
//! from which the acceptance band is derived.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::{Snapshot, SnapshotError};
use crate::thresholds::ThresholdBand;

/// program → metric → standard.
pub type CalibrationSnapshot = BTreeMap<String, BTreeMap<String, CalibrationStandard>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStandard {
    /// Exposure header key holding the covariate (e.g. `TAIRTEMP`).
    pub covariate: String,
    pub slope: f64,
    pub reference_covariate: f64,
    pub warn_frac: f64,
    pub error_frac: f64,
    /// Entity label → nominal corrected value.
    #[serde(default)]
    pub nominal: BTreeMap<String, f64>,
}

impl CalibrationStandard {
    /// `raw - slope * (covariate - reference_covariate)`
    pub fn correct(&self, raw: f64, covariate: f64) -> f64 {
        raw - self.slope * (covariate - self.reference_covariate)
    }

    /// Band for one entity, or `None` when no nominal value is known for it.
    pub fn band_for(&self, label: &str) -> Option<ThresholdBand> {
        self.nominal
            .get(label)
            .map(|n| ThresholdBand::around(*n, self.warn_frac, self.error_frac))
    }
}

impl Snapshot<CalibrationSnapshot> {
    /// Standard for `(program, metric)`.
    ///
    /// A missing program or metric is a [`SnapshotError::MissingKey`]; the
    /// caller decides whether that skips one metric or more.
    pub fn standard(&self, program: Option<&str>, metric: &str) -> Result<&CalibrationStandard, SnapshotError> {
        let program = program.ok_or_else(|| SnapshotError::MissingKey {
            path: self.file.path.clone(),
            key: "PROGRAM (exposure has none)".to_string(),
        })?;
        let metrics = self
            .payload
            .get(program)
            .or_else(|| {
                self.payload
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(program))
                    .map(|(_, m)| m)
            })
            .ok_or_else(|| SnapshotError::MissingKey {
                path: self.file.path.clone(),
                key: program.to_string(),
            })?;
        metrics.get(metric).ok_or_else(|| SnapshotError::MissingKey {
            path: self.file.path.clone(),
            key: format!("{}.{}", program, metric),
        })
    }
}
