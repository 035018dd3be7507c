use std::fs::File;
use std::path::Path;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use nightqa_core::{CellValue, EntityTable, Granularity, RowKey};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::META_GRANULARITY;
use crate::error::StorageError;

/// Read a table written by [`write_table`](super::write_table).
///
/// The granularity comes from the file metadata when `expected` is `None`;
/// otherwise the two must agree.
pub fn read_table(path: &Path, expected: Option<Granularity>) -> Result<EntityTable, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let stored = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == META_GRANULARITY))
        .and_then(|kv| kv.value.as_deref())
        .and_then(Granularity::from_name);
    let granularity = match (expected, stored) {
        (Some(e), Some(s)) if e != s => {
            return Err(layout(path, format!("expected {} table, file holds {}", e, s)));
        }
        (Some(g), _) | (None, Some(g)) => g,
        (None, None) => return Err(layout(path, "granularity metadata missing".to_string())),
    };

    let schema = builder.schema().clone();
    let keys = granularity.key_columns();
    if schema.fields().len() < keys.len() {
        return Err(layout(path, "fewer columns than key columns".to_string()));
    }
    for (field, key) in schema.fields().iter().zip(keys) {
        if field.name() != key.name {
            return Err(layout(
                path,
                format!("key column {} found where {} expected", field.name(), key.name),
            ));
        }
    }

    let mut table = EntityTable::new(granularity);
    let metric_names: Vec<String> = schema.fields()[keys.len()..]
        .iter()
        .map(|f| f.name().clone())
        .collect();
    for name in &metric_names {
        table.ensure_metric(name)?;
    }

    let reader = builder.build()?;
    for batch in reader {
        let batch = batch?;
        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for column in batch.columns() {
                cells.push(cell_at(column, row).map_err(|reason| layout(path, reason))?);
            }
            let metrics = cells.split_off(keys.len());
            let key = RowKey::from_cells(granularity, &cells)?;
            table.insert_row(key, metric_names.iter().zip(metrics))?;
        }
    }
    Ok(table)
}

fn cell_at(array: &ArrayRef, row: usize) -> Result<CellValue, String> {
    if array.is_null(row) {
        return Ok(CellValue::Null);
    }
    let unsupported = || format!("unsupported column type {}", array.data_type());
    match array.data_type() {
        DataType::Int64 => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| CellValue::Int(a.value(row)))
            .ok_or_else(unsupported),
        DataType::Float64 => array
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| CellValue::Float(a.value(row)))
            .ok_or_else(unsupported),
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| CellValue::Text(a.value(row).to_string()))
            .ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}

fn layout(path: &Path, reason: String) -> StorageError {
    StorageError::Layout {
        path: path.to_path_buf(),
        reason,
    }
}
