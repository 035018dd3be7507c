use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use nightqa_core::{EntityTable, ExposureId};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::debug;

use super::builders::build_arrays;
use super::schema::build_schema;
use super::{META_EXPID, META_GRANULARITY, META_NIGHT};
use crate::error::StorageError;

/// Convert a table into a single Arrow batch.
pub fn table_to_batch(table: &EntityTable) -> Result<RecordBatch, StorageError> {
    let schema = Arc::new(build_schema(table));
    let arrays = build_arrays(table, &schema);
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Write one granularity table to a ZSTD-compressed Parquet file.
///
/// The exposure identity and granularity are stored as file key-value
/// metadata so the file is self-describing.
pub fn write_table(table: &EntityTable, path: &Path, id: ExposureId) -> Result<(), StorageError> {
    let batch = table_to_batch(table)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .set_key_value_metadata(Some(vec![
            KeyValue::new(META_GRANULARITY.to_string(), Some(table.granularity().name().to_string())),
            KeyValue::new(META_NIGHT.to_string(), Some(id.night.to_string())),
            KeyValue::new(META_EXPID.to_string(), Some(id.expid.to_string())),
        ]))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(
        path = %path.display(),
        granularity = %table.granularity(),
        rows = table.len(),
        columns = table.metric_columns().len(),
        "wrote table"
    );
    Ok(())
}
