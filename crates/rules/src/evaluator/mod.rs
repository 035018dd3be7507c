//! Per-exposure status evaluation.
//!
//! Every metric column of every merged table is looked up in the threshold
//! store (family = column name). Drift metrics are first corrected with the
//! calibration standard for the exposure's program. Cells are classified
//! individually, then rolled up:
//! - row `QASTATUS` = worst severity over the row's evaluated metrics
//! - table status = worst row
//! - exposure status = worst table

mod report;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::NaiveDate;
use nightqa_core::{Config, EntityTable, Exposure, Granularity};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationSnapshot, CalibrationStandard};
use crate::store::{Resolved, Snapshot, SnapshotError, SnapshotStore};
use crate::thresholds::{ThresholdBand, ThresholdSnapshot};

pub use report::{ExposureStatus, MetricStatus, RowStatus, TableStatus};

/// Where calibration standards come from.
#[derive(Debug, Clone)]
pub struct CalibrationSource {
    pub store: SnapshotStore,
    pub family: String,
}

/// How one metric column is judged.
enum MetricRule {
    Threshold(ThresholdSnapshot),
    Drift {
        standard: CalibrationStandard,
        covariate: f64,
        /// Fallback for entities without a nominal value.
        thresholds: Option<ThresholdSnapshot>,
    },
}

impl MetricRule {
    /// The threshold fallback of a drift rule obeys the same granularity
    /// restriction as a plain threshold rule.
    fn band_for(&self, granularity: Granularity, label: &str) -> Option<ThresholdBand> {
        match self {
            MetricRule::Threshold(snapshot) => snapshot.band_for(label),
            MetricRule::Drift {
                standard, thresholds, ..
            } => standard.band_for(label).or_else(|| {
                thresholds
                    .as_ref()
                    .filter(|t| t.applies_to(granularity))
                    .and_then(|t| t.band_for(label))
            }),
        }
    }
}

/// Classifies merged tables against the snapshots in effect on the
/// exposure's night.
#[derive(Debug, Clone)]
pub struct StatusEvaluator {
    thresholds: SnapshotStore,
    calibration: Option<CalibrationSource>,
    drift_metrics: BTreeSet<String>,
}

impl StatusEvaluator {
    pub fn new(threshold_dir: impl Into<PathBuf>) -> Self {
        Self {
            thresholds: SnapshotStore::new(threshold_dir),
            calibration: None,
            drift_metrics: BTreeSet::new(),
        }
    }

    /// Evaluator wired to the configured threshold and calibration directories.
    pub fn from_config(config: &Config) -> Self {
        let evaluator = Self::new(&config.paths.threshold_dir);
        match &config.paths.calibration_dir {
            Some(dir) => evaluator.with_calibration(dir, &config.paths.calibration_family),
            None => evaluator,
        }
    }

    pub fn with_calibration(mut self, dir: impl Into<PathBuf>, family: impl Into<String>) -> Self {
        self.calibration = Some(CalibrationSource {
            store: SnapshotStore::new(dir),
            family: family.into(),
        });
        self
    }

    /// Metric columns that are drift-corrected before classification.
    pub fn with_drift_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drift_metrics.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn drift_metrics(&self) -> &BTreeSet<String> {
        &self.drift_metrics
    }

    /// Evaluate every table of one exposure.
    ///
    /// Only a family with zero snapshot files is fatal. Any other problem
    /// resolving a metric's rule skips that metric and is recorded in
    /// [`ExposureStatus::warnings`].
    pub fn evaluate(
        &self,
        exposure: &Exposure,
        tables: &BTreeMap<Granularity, EntityTable>,
    ) -> Result<ExposureStatus, SnapshotError> {
        let date = exposure
            .id
            .night_date()
            .map_err(|e| SnapshotError::Validation(e.to_string()))?;
        let families = self.thresholds.families()?;
        let mut warnings = Vec::new();

        let calibration = self.resolve_calibration(date, tables, &mut warnings)?;

        let metrics: BTreeSet<&String> = tables.values().flat_map(|t| t.metric_columns()).collect();
        let mut rules: BTreeMap<&str, MetricRule> = BTreeMap::new();
        for metric in metrics {
            let rule = self.resolve_rule(metric, date, exposure, &families, calibration.as_ref(), &mut warnings)?;
            if let Some(rule) = rule {
                rules.insert(metric.as_str(), rule);
            }
        }

        let mut statuses = BTreeMap::new();
        for (granularity, table) in tables {
            let mut evaluated = Vec::new();
            let mut per_metric = Vec::new();

            for (idx, metric) in table.metric_columns().iter().enumerate() {
                let Some(rule) = rules.get(metric.as_str()) else {
                    continue;
                };
                if let MetricRule::Threshold(snapshot) = rule {
                    if !snapshot.applies_to(*granularity) {
                        debug!(metric = %metric, granularity = %granularity, "threshold restricted to another table");
                        continue;
                    }
                }
                evaluated.push(metric.clone());
                per_metric.push((idx, metric, rule));
            }

            let rows = table
                .rows()
                .map(|(key, values)| {
                    let entity = granularity.entity_label(key);
                    let mut metrics = BTreeMap::new();
                    for (idx, metric, rule) in &per_metric {
                        if let Some(status) = classify_cell(rule, *granularity, &entity, values.get(*idx).and_then(|c| c.as_f64())) {
                            metrics.insert((*metric).clone(), status);
                        }
                    }
                    RowStatus::new(key.clone(), entity, metrics)
                })
                .collect();

            let status = TableStatus::new(evaluated, rows);
            debug!(
                granularity = %granularity,
                rows = status.rows.len(),
                metrics = status.evaluated_metrics.len(),
                status = %status.status,
                "table evaluated"
            );
            statuses.insert(*granularity, status);
        }

        let report = ExposureStatus::new(exposure.id, statuses, warnings);
        info!(
            night = exposure.id.night,
            expid = exposure.id.expid,
            status = %report.status,
            warnings = report.warnings.len(),
            "exposure status evaluated"
        );
        Ok(report)
    }

    /// Resolve the calibration snapshot when a drift metric is present.
    fn resolve_calibration(
        &self,
        date: NaiveDate,
        tables: &BTreeMap<Granularity, EntityTable>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<Snapshot<CalibrationSnapshot>>, SnapshotError> {
        let Some(source) = &self.calibration else {
            return Ok(None);
        };
        let needed = tables
            .values()
            .flat_map(|t| t.metric_columns())
            .any(|m| self.drift_metrics.contains(m));
        if !needed {
            return Ok(None);
        }

        match source.store.resolve::<CalibrationSnapshot>(&source.family, date) {
            Ok(resolved) => Ok(Some(note_stale(resolved, date, warnings))),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(family = %source.family, error = %e, "calibration snapshot unusable; drift metrics skipped");
                warnings.push(format!("calibration {}: {}", source.family, e));
                Ok(None)
            }
        }
    }

    /// Rule for one metric column, `None` when the metric is not evaluated.
    fn resolve_rule(
        &self,
        metric: &str,
        date: NaiveDate,
        exposure: &Exposure,
        families: &BTreeSet<String>,
        calibration: Option<&Snapshot<CalibrationSnapshot>>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<MetricRule>, SnapshotError> {
        let thresholds = if families.contains(metric) {
            self.load_thresholds(metric, date, warnings)?
        } else {
            None
        };

        let drift = self.calibration.is_some() && self.drift_metrics.contains(metric);
        if !drift {
            if thresholds.is_none() {
                debug!(metric = %metric, "no thresholds for metric; not evaluated");
            }
            return Ok(thresholds.map(MetricRule::Threshold));
        }

        // Calibration was needed but could not be loaded; already reported.
        let Some(calibration) = calibration else {
            return Ok(None);
        };
        let standard = match calibration.standard(exposure.program.as_deref(), metric) {
            Ok(s) => s.clone(),
            Err(e) => {
                warn!(metric = %metric, error = %e, "no calibration standard; metric skipped");
                warnings.push(format!("{}: {}", metric, e));
                return Ok(None);
            }
        };
        let Some(covariate) = exposure.covariate(&standard.covariate) else {
            warn!(metric = %metric, covariate = %standard.covariate, "covariate missing from exposure header; metric skipped");
            warnings.push(format!("{}: covariate {} missing from exposure header", metric, standard.covariate));
            return Ok(None);
        };
        Ok(Some(MetricRule::Drift {
            standard,
            covariate,
            thresholds,
        }))
    }

    fn load_thresholds(
        &self,
        metric: &str,
        date: NaiveDate,
        warnings: &mut Vec<String>,
    ) -> Result<Option<ThresholdSnapshot>, SnapshotError> {
        let resolved = match self.thresholds.resolve::<ThresholdSnapshot>(metric, date) {
            Ok(r) => note_stale(r, date, warnings),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(metric = %metric, error = %e, "threshold snapshot unusable; metric skipped");
                warnings.push(format!("{}: {}", metric, e));
                return Ok(None);
            }
        };
        if let Err(e) = resolved.payload.validate() {
            warn!(metric = %metric, path = %resolved.file.path.display(), error = %e, "invalid threshold snapshot; metric skipped");
            warnings.push(format!("{}: {}", metric, e));
            return Ok(None);
        }
        Ok(Some(resolved.payload))
    }
}

/// Unwrap a resolution, recording a warning when it fell back to the earliest snapshot.
fn note_stale<T>(resolved: Resolved<T>, date: NaiveDate, warnings: &mut Vec<String>) -> Snapshot<T> {
    if resolved.stale {
        warnings.push(format!(
            "{}: no snapshot effective on {}; using earliest ({})",
            resolved.snapshot.file.family, date, resolved.snapshot.file.effective
        ));
    }
    resolved.snapshot
}

fn classify_cell(
    rule: &MetricRule,
    granularity: Granularity,
    entity: &str,
    value: Option<f64>,
) -> Option<MetricStatus> {
    let value = value?;
    let band = rule.band_for(granularity, entity)?;
    let corrected = match rule {
        MetricRule::Drift {
            standard, covariate, ..
        } => Some(standard.correct(value, *covariate)),
        MetricRule::Threshold(_) => None,
    };
    Some(MetricStatus {
        value,
        corrected,
        severity: band.classify(corrected.unwrap_or(value)),
    })
}
