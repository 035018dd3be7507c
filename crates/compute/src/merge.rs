//! Outer join of same-granularity provider tables.
//!
//! Tables are joined on their granularity's key columns. Key cells are
//! normalized when a [`RowKey`](nightqa_core::RowKey) is built, so keys
//! emitted with different widths or case by different providers compare
//! equal here.

use std::collections::BTreeMap;

use nightqa_core::{EntityTable, Granularity, QaError};
use tracing::warn;

/// Merge every table into exactly one table per granularity.
///
/// A granularity with a single input table passes it through unchanged.
/// When two providers fill the same (row, column) with different values
/// the first provider's value is kept.
pub fn merge_tables<I>(tables: I) -> Result<BTreeMap<Granularity, EntityTable>, QaError>
where
    I: IntoIterator<Item = EntityTable>,
{
    let mut merged: BTreeMap<Granularity, EntityTable> = BTreeMap::new();
    for table in tables {
        match merged.remove(&table.granularity()) {
            None => {
                merged.insert(table.granularity(), table);
            }
            Some(base) => {
                let joined = outer_join(base, &table)?;
                merged.insert(joined.granularity(), joined);
            }
        }
    }
    Ok(merged)
}

/// Outer-join `other` into `base`. Keys present only in one side keep
/// nulls for the other side's columns.
pub fn outer_join(mut base: EntityTable, other: &EntityTable) -> Result<EntityTable, QaError> {
    if base.granularity() != other.granularity() {
        return Err(QaError::Other(format!(
            "cannot join {} table with {} table",
            base.granularity(),
            other.granularity()
        )));
    }

    let indices = other
        .metric_columns()
        .iter()
        .map(|m| base.ensure_metric(m))
        .collect::<Result<Vec<_>, _>>()?;

    for (key, values) in other.rows() {
        let row = base.row_entry(key.clone())?;
        for ((column, idx), value) in other.metric_columns().iter().zip(&indices).zip(values) {
            if value.is_null() {
                continue;
            }
            let slot = &mut row[*idx];
            if slot.is_null() {
                *slot = value.clone();
            } else if slot != value {
                warn!(key = %key, column = %column, "conflicting values for merged column; keeping first");
            }
        }
    }
    Ok(base)
}
