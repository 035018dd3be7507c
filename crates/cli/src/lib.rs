//! Orchestration for the nightly QA pipeline.

pub mod external;
pub mod pipeline;

pub use external::{ExternalError, ExternalProcessor};
pub use pipeline::{LoopOptions, LoopSummary, Pipeline, PipelineError, ProcessSummary};
