use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{list_products, PREPROC};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// Single-row summary: exposure time and number of cameras read out.
pub struct ExposureSummaryProvider;

impl MetricProvider for ExposureSummaryProvider {
    fn name(&self) -> &str {
        "exposure_summary"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Exposure
    }

    fn applicable(&self, _observation_kind: &str) -> bool {
        true
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let cameras = list_products(ctx.input_dir(), PREPROC, ctx.exposure.id.expid)?;
        if cameras.is_empty() {
            return Ok(None);
        }

        let mut table = EntityTable::new(Granularity::Exposure);
        table.insert_row(
            RowKey::exposure(ctx.exposure.id),
            [
                ("EXPTIME", CellValue::Float(ctx.exposure.exptime)),
                ("NCAM", CellValue::Int(cameras.len() as i64)),
            ],
        )?;
        Ok(Some(table))
    }
}
