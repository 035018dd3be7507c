//! Arrow schema for an [`EntityTable`]: key columns first, then metrics.

use arrow::datatypes::{DataType, Field, Schema};
use nightqa_core::{CellValue, EntityTable, KeyKind};

/// Arrow type for a key column.
pub(crate) fn key_type(kind: KeyKind) -> DataType {
    match kind {
        KeyKind::Int => DataType::Int64,
        KeyKind::Text => DataType::Utf8,
    }
}

/// Narrowest Arrow type holding every non-null cell of one metric column.
///
/// All-integer columns stay Int64, mixed numeric columns become Float64,
/// anything containing text is Utf8. An all-null column is Float64.
pub(crate) fn metric_type(table: &EntityTable, idx: usize) -> DataType {
    let mut saw_float = false;
    let mut saw_int = false;
    for (_, values) in table.rows() {
        match values.get(idx) {
            Some(CellValue::Text(_)) => return DataType::Utf8,
            Some(CellValue::Float(_)) => saw_float = true,
            Some(CellValue::Int(_)) => saw_int = true,
            Some(CellValue::Null) | None => {}
        }
    }
    if saw_int && !saw_float {
        DataType::Int64
    } else {
        DataType::Float64
    }
}

pub(crate) fn build_schema(table: &EntityTable) -> Schema {
    let keys = table
        .granularity()
        .key_columns()
        .iter()
        .map(|k| Field::new(k.name, key_type(k.kind), false));
    let metrics = table
        .metric_columns()
        .iter()
        .enumerate()
        .map(|(i, name)| Field::new(name, metric_type(table, i), true));
    Schema::new(keys.chain(metrics).collect::<Vec<Field>>())
}
