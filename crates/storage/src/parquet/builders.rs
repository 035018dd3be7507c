//! Build typed Arrow arrays from table rows.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Schema};
use nightqa_core::{CellValue, EntityTable, KeyValue};

pub(crate) fn build_arrays(table: &EntityTable, schema: &Schema) -> Vec<ArrayRef> {
    let num_rows = table.len();
    let num_keys = table.granularity().key_columns().len();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (col_idx, field) in schema.fields().iter().enumerate() {
        let cells: Vec<CellValue> = if col_idx < num_keys {
            table
                .rows()
                .map(|(key, _)| key.parts().get(col_idx).map(KeyValue::to_cell).unwrap_or_default())
                .collect()
        } else {
            let metric = col_idx - num_keys;
            table
                .rows()
                .map(|(_, values)| values.get(metric).cloned().unwrap_or_default())
                .collect()
        };

        let array: ArrayRef = match field.data_type() {
            DataType::Int64 => {
                let mut builder = Int64Builder::with_capacity(num_rows);
                for cell in &cells {
                    match cell {
                        CellValue::Int(v) => builder.append_value(*v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Float64 => {
                let mut builder = Float64Builder::with_capacity(num_rows);
                for cell in &cells {
                    match cell {
                        CellValue::Float(v) => builder.append_value(*v),
                        CellValue::Int(v) => builder.append_value(*v as f64),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            _ => {
                let mut builder = StringBuilder::with_capacity(num_rows, num_rows * 8);
                for cell in &cells {
                    match cell {
                        CellValue::Text(s) => builder.append_value(s),
                        CellValue::Int(v) => builder.append_value(v.to_string()),
                        CellValue::Float(v) => builder.append_value(v.to_string()),
                        CellValue::Null => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
        };
        arrays.push(array);
    }
    arrays
}
