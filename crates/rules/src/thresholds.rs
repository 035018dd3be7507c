//! Acceptance-threshold snapshots.
//!
//! One snapshot family per metric column. A snapshot either carries a
//! single band shared by every entity, a per-entity band map keyed by
//! entity label (`B0A`, `R3`, `123`, ...), or both.

use std::collections::BTreeMap;

use nightqa_core::{Granularity, Severity};
use serde::{Deserialize, Serialize};

/// Acceptance band `(lower_err, lower, upper, upper_err)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub lower_err: f64,
    pub lower: f64,
    pub upper: f64,
    pub upper_err: f64,
}

impl ThresholdBand {
    pub fn new(lower_err: f64, lower: f64, upper: f64, upper_err: f64) -> Self {
        Self {
            lower_err,
            lower,
            upper,
            upper_err,
        }
    }

    /// Band around a nominal value: `nominal * (1 ∓ err_frac)` for the error
    /// edges, `nominal * (1 ∓ warn_frac)` for the warning edges.
    ///
    /// A negative nominal flips the sign of every edge, so the edges are
    /// re-ordered to keep the band well formed.
    pub fn around(nominal: f64, warn_frac: f64, err_frac: f64) -> Self {
        let lo_err = nominal * (1.0 - err_frac);
        let hi_err = nominal * (1.0 + err_frac);
        let lo = nominal * (1.0 - warn_frac);
        let hi = nominal * (1.0 + warn_frac);
        Self::new(lo_err.min(hi_err), lo.min(hi), lo.max(hi), lo_err.max(hi_err))
    }

    /// Classify `value`. Equality with an edge resolves to the stricter side.
    pub fn classify(&self, value: f64) -> Severity {
        if value <= self.lower_err || value >= self.upper_err {
            Severity::Error
        } else if value <= self.lower || value >= self.upper {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let edges = [self.lower_err, self.lower, self.upper, self.upper_err];
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(format!("band has non-finite edge: {:?}", edges));
        }
        if !(self.lower_err <= self.lower && self.lower <= self.upper && self.upper <= self.upper_err) {
            return Err(format!(
                "band edges out of order: lower_err={} lower={} upper={} upper_err={}",
                self.lower_err, self.lower, self.upper, self.upper_err
            ));
        }
        Ok(())
    }
}

/// Payload of one threshold snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    /// Restricts the snapshot to one table; `None` applies to whichever
    /// table carries the metric column.
    #[serde(default)]
    pub granularity: Option<Granularity>,
    /// Shared band for every entity.
    #[serde(default)]
    pub band: Option<ThresholdBand>,
    /// Per-entity bands. When non-empty, only listed entities are evaluated.
    #[serde(default)]
    pub entities: BTreeMap<String, ThresholdBand>,
}

impl ThresholdSnapshot {
    pub fn applies_to(&self, granularity: Granularity) -> bool {
        self.granularity.map_or(true, |g| g == granularity)
    }

    /// Band for one entity label, or `None` when the entity is not covered.
    pub fn band_for(&self, label: &str) -> Option<ThresholdBand> {
        if self.entities.is_empty() {
            self.band
        } else {
            self.entities.get(label).copied()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.band.is_none() && self.entities.is_empty() {
            return Err("threshold snapshot defines neither `band` nor `entities`".to_string());
        }
        if let Some(band) = &self.band {
            band.validate()?;
        }
        for (label, band) in &self.entities {
            band.validate().map_err(|e| format!("entity {}: {}", label, e))?;
        }
        Ok(())
    }
}
