use std::collections::BTreeMap;

use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{load_products, FrameProduct, FRAME};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// Sky flux per fiber, summed over the arms that observed it.
pub struct FiberSkyProvider;

impl MetricProvider for FiberSkyProvider {
    fn name(&self) -> &str {
        "fiber_sky"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Fiber
    }

    fn applicable(&self, observation_kind: &str) -> bool {
        observation_kind == "SCIENCE"
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let id = ctx.exposure.id;
        let frames = load_products::<FrameProduct>(ctx.input_dir(), FRAME, id.expid)?;
        if frames.is_empty() {
            return Ok(None);
        }

        // (spectro, fiber) -> (sky sum, arm count)
        let mut sums: BTreeMap<(u8, u32), (f64, i64)> = BTreeMap::new();
        for (camera, frame) in &frames {
            for (fiber, sky) in frame.per_fiber(&frame.sky_flux, "sky_flux")? {
                if !sky.is_finite() {
                    continue;
                }
                let entry = sums.entry((camera.spectro, fiber)).or_insert((0.0, 0));
                entry.0 += sky;
                entry.1 += 1;
            }
        }

        let mut table = EntityTable::new(Granularity::Fiber);
        for ((spectro, fiber), (sky, narm)) in sums {
            table.insert_row(
                RowKey::fiber(id, spectro, fiber),
                [("SKY_FLUX", CellValue::Float(sky)), ("NARM", CellValue::Int(narm))],
            )?;
        }
        Ok(Some(table))
    }
}
