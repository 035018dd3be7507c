use nightqa_compute::ComputeError;
use nightqa_core::ExposureId;
use nightqa_ingest::IngestError;
use nightqa_rules::SnapshotError;
use nightqa_storage::StorageError;
use thiserror::Error;

use crate::external::ExternalError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("processing step failed: {0}")]
    External(#[from] ExternalError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// No provider produced a table; the exposure stays unprocessed.
    #[error("no metric data for exposure {0}")]
    NoData(ExposureId),

    #[error("status evaluation failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
