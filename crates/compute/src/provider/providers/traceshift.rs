use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};

use crate::provider::products::{load_products, PsfProduct, PSF};
use crate::provider::task::{MetricProvider, ProviderContext, ProviderError};

/// Per-camera spectral trace shifts (mean/min/max in x and y).
pub struct TraceShiftProvider;

impl MetricProvider for TraceShiftProvider {
    fn name(&self) -> &str {
        "traceshift"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Camera
    }

    fn applicable(&self, observation_kind: &str) -> bool {
        !matches!(observation_kind, "ZERO" | "DARK")
    }

    fn compute(&self, ctx: &ProviderContext) -> Result<Option<EntityTable>, ProviderError> {
        let id = ctx.exposure.id;
        let products = load_products::<PsfProduct>(ctx.input_dir(), PSF, id.expid)?;
        if products.is_empty() {
            return Ok(None);
        }

        let mut table = EntityTable::new(Granularity::Camera);
        for (camera, psf) in products {
            let (mean_dx, min_dx, max_dx) = summarize(&psf.dx);
            let (mean_dy, min_dy, max_dy) = summarize(&psf.dy);
            table.insert_row(
                RowKey::camera(id, camera.spectro, camera.arm),
                [
                    ("MEANDX", mean_dx),
                    ("MINDX", min_dx),
                    ("MAXDX", max_dx),
                    ("MEANDY", mean_dy),
                    ("MINDY", min_dy),
                    ("MAXDY", max_dy),
                ],
            )?;
        }
        Ok(Some(table))
    }
}

/// (mean, min, max) over finite values; nulls when there are none.
fn summarize(values: &[f64]) -> (CellValue, CellValue, CellValue) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (CellValue::Null, CellValue::Null, CellValue::Null);
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (mean.into(), min.into(), max.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_skips_non_finite() {
        let (mean, min, max) = summarize(&[1.0, f64::NAN, -1.0, 3.0]);
        assert_eq!(mean, CellValue::Float(1.0));
        assert_eq!(min, CellValue::Float(-1.0));
        assert_eq!(max, CellValue::Float(3.0));
        assert_eq!(summarize(&[]).0, CellValue::Null);
    }
}
