use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{load_products, FrameProduct, FRAME};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

pub const INTEG_RAW_FLUX: &str = "INTEG_RAW_FLUX";

/// Total integrated flux per camera for calibration lamps. The value
/// drifts with the air temperature, so it is corrected against the
/// calibration standard before classification.
pub struct CalibIntegralsProvider;

impl MetricProvider for CalibIntegralsProvider {
    fn name(&self) -> &str {
        "calib_integrals"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Camera
    }

    fn applicable(&self, observation_kind: &str) -> bool {
        matches!(observation_kind, "ARC" | "FLAT")
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let id = ctx.exposure.id;
        let frames = load_products::<FrameProduct>(ctx.input_dir(), FRAME, id.expid)?;
        if frames.is_empty() {
            return Ok(None);
        }

        let mut table = EntityTable::new(Granularity::Camera);
        for (camera, frame) in frames {
            let total: f64 = frame
                .per_fiber(&frame.integrated_flux, "integrated_flux")?
                .map(|(_, flux)| flux)
                .filter(|f| f.is_finite())
                .sum();
            table.insert_row(
                RowKey::camera(id, camera.spectro, camera.arm),
                [(INTEG_RAW_FLUX, CellValue::Float(total))],
            )?;
        }
        Ok(Some(table))
    }

    fn drift_metrics(&self) -> &'static [&'static str] {
        &[INTEG_RAW_FLUX]
    }
}
