//! Date-versioned QA configuration and status evaluation.
//!
//! This crate provides:
//! - A filesystem snapshot store resolving `(family, date)` to the snapshot in effect
//! - Acceptance-threshold snapshots (one family per metric column)
//! - Calibration reference standards with covariate drift correction
//! - The status evaluator that classifies merged tables and rolls up severities

pub mod calibration;
pub mod evaluator;
pub mod store;
pub mod thresholds;

pub use calibration::{CalibrationSnapshot, CalibrationStandard};
pub use evaluator::{CalibrationSource, ExposureStatus, MetricStatus, RowStatus, StatusEvaluator, TableStatus};
pub use store::{Resolved, Snapshot, SnapshotError, SnapshotFile, SnapshotStore};
pub use thresholds::{ThresholdBand, ThresholdSnapshot};
