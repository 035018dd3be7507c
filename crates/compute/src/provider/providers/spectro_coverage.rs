use std::collections::{BTreeMap, BTreeSet};

use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{list_products, FRAME, PREPROC};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// How many cameras of each spectrograph produced preprocessed images and
/// extracted frames.
pub struct SpectroCoverageProvider;

impl MetricProvider for SpectroCoverageProvider {
    fn name(&self) -> &str {
        "spectro_coverage"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Spectro
    }

    fn applicable(&self, _observation_kind: &str) -> bool {
        true
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let expid = ctx.exposure.id.expid;
        let preproc = list_products(ctx.input_dir(), PREPROC, expid)?;
        let frames = list_products(ctx.input_dir(), FRAME, expid)?;
        if preproc.is_empty() && frames.is_empty() {
            return Ok(None);
        }

        let mut counts: BTreeMap<u8, (i64, i64)> = BTreeMap::new();
        let spectros: BTreeSet<u8> = preproc.iter().chain(&frames).map(|(c, _)| c.spectro).collect();
        for spectro in spectros {
            counts.insert(spectro, (0, 0));
        }
        for (camera, _) in &preproc {
            if let Some(c) = counts.get_mut(&camera.spectro) {
                c.0 += 1;
            }
        }
        for (camera, _) in &frames {
            if let Some(c) = counts.get_mut(&camera.spectro) {
                c.1 += 1;
            }
        }

        let mut table = EntityTable::new(Granularity::Spectro);
        for (spectro, (n_preproc, n_frame)) in counts {
            table.insert_row(
                RowKey::spectro(ctx.exposure.id, spectro),
                [
                    ("NCAM_PREPROC", CellValue::Int(n_preproc)),
                    ("NCAM_FRAME", CellValue::Int(n_frame)),
                ],
            )?;
        }
        Ok(Some(table))
    }
}
