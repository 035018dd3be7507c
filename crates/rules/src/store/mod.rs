//! Date-versioned configuration snapshots.
//!
//! A snapshot directory holds files named `{family}-{YYYYMMDD}.{json|yaml|yml}`.
//! Resolving `(family, date)` picks the newest snapshot whose effective date
//! is on or before `date`; when every snapshot is newer than `date` the
//! earliest one is returned and flagged as stale. A family with no files at
//! all is a hard error.
//!
//! The same store serves threshold families (one family per metric) and the
//! calibration family (keyed by observing program).

mod core;
mod error;


pub use self::core::{parse_snapshot_name, select_snapshot, Resolved, Snapshot, SnapshotFile, SnapshotStore};
pub use self::error::{Result, SnapshotError};
