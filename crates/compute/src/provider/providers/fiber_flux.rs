use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{load_products, FrameProduct, FRAME};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// Integrated flux for every fiber on every camera.
pub struct FiberFluxProvider;

impl MetricProvider for FiberFluxProvider {
    fn name(&self) -> &str {
        "fiber_flux"
    }

    fn granularity(&self) -> Granularity {
        Granularity::CamFiber
    }

    fn applicable(&self, observation_kind: &str) -> bool {
        matches!(observation_kind, "SCIENCE" | "FLAT")
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let id = ctx.exposure.id;
        let frames = load_products::<FrameProduct>(ctx.input_dir(), FRAME, id.expid)?;
        if frames.is_empty() {
            return Ok(None);
        }

        let mut table = EntityTable::new(Granularity::CamFiber);
        for (camera, frame) in &frames {
            for (fiber, flux) in frame.per_fiber(&frame.integrated_flux, "integrated_flux")? {
                let value = if flux.is_finite() { CellValue::Float(flux) } else { CellValue::Null };
                table.insert_row(
                    RowKey::camfiber(id, camera.spectro, camera.arm, fiber),
                    [("INTEG_FLUX", value)],
                )?;
            }
        }
        Ok(Some(table))
    }
}
