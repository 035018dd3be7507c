//! Raw exposure discovery and metadata.

pub mod discovery;
pub mod error;
pub mod processed;
pub mod request;

pub use discovery::{DiscoveryMode, ExposureDiscovery};
pub use error::IngestError;
pub use processed::ProcessedSet;
pub use request::read_exposure;
