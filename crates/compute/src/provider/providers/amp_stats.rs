use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{load_products, PreprocProduct, PREPROC};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// Per-amplifier bias, read noise and cosmic-ray pixel fraction from the
/// preprocessed images.
pub struct AmpStatsProvider;

impl MetricProvider for AmpStatsProvider {
    fn name(&self) -> &str {
        "amp_stats"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Amp
    }

    fn applicable(&self, _observation_kind: &str) -> bool {
        true
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let id = ctx.exposure.id;
        let products = load_products::<PreprocProduct>(ctx.input_dir(), PREPROC, id.expid)?;
        if products.is_empty() {
            return Ok(None);
        }

        let mut table = EntityTable::new(Granularity::Amp);
        for (camera, product) in products {
            for (name, stats) in &product.amps {
                let mut chars = name.trim().chars();
                let amp = match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => c,
                    _ => {
                        return Err(ProviderError::Invalid(format!(
                            "preproc {}: bad amplifier name {:?}",
                            camera, name
                        )))
                    }
                };
                let cosmics_rate = if stats.npix > 0 {
                    CellValue::Float(stats.cosmic_pixels as f64 / stats.npix as f64)
                } else {
                    CellValue::Null
                };
                table.insert_row(
                    RowKey::amp(id, camera.spectro, camera.arm, amp),
                    [
                        ("BIAS", CellValue::Float(stats.bias)),
                        ("READNOISE", CellValue::Float(stats.readnoise)),
                        ("COSMICS_RATE", cosmics_rate),
                    ],
                )?;
            }
        }
        Ok(Some(table))
    }
}
