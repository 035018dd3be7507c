//! Status report types produced by [`StatusEvaluator`](super::StatusEvaluator).

use std::collections::BTreeMap;

use nightqa_core::{ExposureId, Granularity, RowKey, Severity};
use serde::{Deserialize, Serialize};

/// Classification of one (metric, entity) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatus {
    /// Value as stored in the table.
    pub value: f64,
    /// Drift-corrected value, for calibration metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected: Option<f64>,
    pub severity: Severity,
}

/// One table row and its composite `QASTATUS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowStatus {
    pub key: RowKey,
    pub entity: String,
    #[serde(rename = "QASTATUS")]
    pub qastatus: Severity,
    /// Evaluated metrics only; unevaluated cells are absent.
    pub metrics: BTreeMap<String, MetricStatus>,
}

impl RowStatus {
    pub fn new(key: RowKey, entity: String, metrics: BTreeMap<String, MetricStatus>) -> Self {
        let qastatus = Severity::worst(metrics.values().map(|m| m.severity));
        Self {
            key,
            entity,
            qastatus,
            metrics,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStatus {
    pub status: Severity,
    /// Metric columns that had an applicable threshold or calibration standard.
    pub evaluated_metrics: Vec<String>,
    pub rows: Vec<RowStatus>,
}

impl TableStatus {
    pub fn new(evaluated_metrics: Vec<String>, rows: Vec<RowStatus>) -> Self {
        let status = Severity::worst(rows.iter().map(|r| r.qastatus));
        Self {
            status,
            evaluated_metrics,
            rows,
        }
    }

    /// Count of rows at each severity.
    pub fn counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.qastatus).or_insert(0) += 1;
        }
        counts
    }
}

/// Exposure-level status: worst `QASTATUS` over every table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureStatus {
    pub exposure: ExposureId,
    pub status: Severity,
    pub tables: BTreeMap<Granularity, TableStatus>,
    /// Non-fatal problems met while evaluating (stale snapshots, skipped metrics).
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ExposureStatus {
    pub fn new(exposure: ExposureId, tables: BTreeMap<Granularity, TableStatus>, warnings: Vec<String>) -> Self {
        let status = Severity::worst(tables.values().map(|t| t.status));
        Self {
            exposure,
            status,
            tables,
            warnings,
        }
    }
}
