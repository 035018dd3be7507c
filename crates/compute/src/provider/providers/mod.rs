mod amp_stats;
mod calib_integrals;
mod exposure_summary;
mod fiber_flux;
mod fiber_sky;
mod spectro_coverage;
mod traceshift;

pub use amp_stats::AmpStatsProvider;
pub use calib_integrals::{CalibIntegralsProvider, INTEG_RAW_FLUX};
pub use exposure_summary::ExposureSummaryProvider;
pub use fiber_flux::FiberFluxProvider;
pub use fiber_sky::FiberSkyProvider;
pub use spectro_coverage::SpectroCoverageProvider;
pub use traceshift::TraceShiftProvider;
