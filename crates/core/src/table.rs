//! Entity tables: metric rows keyed by a granularity-specific tuple of
//! identifying columns.
//!
//! The granularity → key-column mapping lives here and nowhere else; the
//! merger, the Parquet writer and the status evaluator all read it from
//! [`Granularity::key_columns`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QaError;
use crate::exposure::ExposureId;

// ── Granularity ───────────────────────────────────────────────

/// Entity level at which a metric is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "PER_AMP")]
    Amp,
    #[serde(rename = "PER_CAMERA")]
    Camera,
    #[serde(rename = "PER_FIBER")]
    Fiber,
    #[serde(rename = "PER_CAMFIBER")]
    CamFiber,
    #[serde(rename = "PER_SPECTRO")]
    Spectro,
    #[serde(rename = "PER_EXP")]
    Exposure,
}

/// Storage type of a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Int,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: &'static str,
    pub kind: KeyKind,
}

const NIGHT: KeyColumn = KeyColumn { name: "NIGHT", kind: KeyKind::Int };
const EXPID: KeyColumn = KeyColumn { name: "EXPID", kind: KeyKind::Int };
const SPECTRO: KeyColumn = KeyColumn { name: "SPECTRO", kind: KeyKind::Int };
const CAM: KeyColumn = KeyColumn { name: "CAM", kind: KeyKind::Text };
const AMP: KeyColumn = KeyColumn { name: "AMP", kind: KeyKind::Text };
const FIBER: KeyColumn = KeyColumn { name: "FIBER", kind: KeyKind::Int };

const AMP_KEYS: &[KeyColumn] = &[NIGHT, EXPID, SPECTRO, CAM, AMP];
const CAMERA_KEYS: &[KeyColumn] = &[NIGHT, EXPID, SPECTRO, CAM];
const FIBER_KEYS: &[KeyColumn] = &[NIGHT, EXPID, SPECTRO, FIBER];
const CAMFIBER_KEYS: &[KeyColumn] = &[NIGHT, EXPID, SPECTRO, CAM, FIBER];
const SPECTRO_KEYS: &[KeyColumn] = &[NIGHT, EXPID, SPECTRO];
const EXPOSURE_KEYS: &[KeyColumn] = &[NIGHT, EXPID];

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Amp,
        Granularity::Camera,
        Granularity::Fiber,
        Granularity::CamFiber,
        Granularity::Spectro,
        Granularity::Exposure,
    ];

    /// Ordered key columns for this granularity.
    pub fn key_columns(self) -> &'static [KeyColumn] {
        match self {
            Granularity::Amp => AMP_KEYS,
            Granularity::Camera => CAMERA_KEYS,
            Granularity::Fiber => FIBER_KEYS,
            Granularity::CamFiber => CAMFIBER_KEYS,
            Granularity::Spectro => SPECTRO_KEYS,
            Granularity::Exposure => EXPOSURE_KEYS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Granularity::Amp => "PER_AMP",
            Granularity::Camera => "PER_CAMERA",
            Granularity::Fiber => "PER_FIBER",
            Granularity::CamFiber => "PER_CAMFIBER",
            Granularity::Spectro => "PER_SPECTRO",
            Granularity::Exposure => "PER_EXP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }

    pub fn is_key_column(self, column: &str) -> bool {
        self.key_columns().iter().any(|k| k.name == column)
    }

    /// Label identifying one entity within an exposure, used to index
    /// per-entity thresholds and calibration standards.
    ///
    /// amp `B0A`, camera `B0`, fiber `123`, camera-fiber `B123`,
    /// spectrograph `0`, exposure `` (empty).
    pub fn entity_label(self, key: &RowKey) -> String {
        let part = |name: &str| {
            self.key_columns()
                .iter()
                .position(|k| k.name == name)
                .and_then(|i| key.parts().get(i))
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        match self {
            Granularity::Amp => format!("{}{}{}", part("CAM"), part("SPECTRO"), part("AMP")),
            Granularity::Camera => format!("{}{}", part("CAM"), part("SPECTRO")),
            Granularity::Fiber => part("FIBER"),
            Granularity::CamFiber => format!("{}{}", part("CAM"), part("FIBER")),
            Granularity::Spectro => part("SPECTRO"),
            Granularity::Exposure => String::new(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Cells and keys ────────────────────────────────────────────

/// A single table cell. Metric columns may hold any variant; `Null` marks
/// an entity for which a provider produced no value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the cell; NaN and non-numeric cells yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

/// A normalized key cell.
///
/// Providers may emit categorical keys with different widths or padding
/// (`"B"`, `"b "`, `"B\0"`); normalization maps them all to one form so
/// the merge joins them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Normalize a raw cell to the fixed representation of `kind`.
    pub fn normalize(kind: KeyKind, cell: &CellValue) -> Option<KeyValue> {
        match kind {
            KeyKind::Int => match cell {
                CellValue::Int(i) => Some(KeyValue::Int(*i)),
                CellValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                    Some(KeyValue::Int(*f as i64))
                }
                CellValue::Text(s) => s.trim().parse().ok().map(KeyValue::Int),
                _ => None,
            },
            KeyKind::Text => {
                let raw = match cell {
                    CellValue::Text(s) => s.clone(),
                    CellValue::Int(i) => i.to_string(),
                    _ => return None,
                };
                let cleaned = raw
                    .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                    .to_uppercase();
                if cleaned.is_empty() {
                    None
                } else {
                    Some(KeyValue::Text(cleaned))
                }
            }
        }
    }

    pub fn to_cell(&self) -> CellValue {
        match self {
            KeyValue::Int(i) => CellValue::Int(*i),
            KeyValue::Text(s) => CellValue::Text(s.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered key tuple of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(Vec<KeyValue>);

impl RowKey {
    pub fn parts(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn exposure(id: ExposureId) -> Self {
        RowKey(vec![KeyValue::Int(id.night as i64), KeyValue::Int(id.expid as i64)])
    }

    pub fn spectro(id: ExposureId, spectro: u8) -> Self {
        Self::exposure(id).with(KeyValue::Int(spectro as i64))
    }

    pub fn camera(id: ExposureId, spectro: u8, cam: char) -> Self {
        Self::spectro(id, spectro).with(text_key(cam))
    }

    pub fn amp(id: ExposureId, spectro: u8, cam: char, amp: char) -> Self {
        Self::camera(id, spectro, cam).with(text_key(amp))
    }

    pub fn fiber(id: ExposureId, spectro: u8, fiber: u32) -> Self {
        Self::spectro(id, spectro).with(KeyValue::Int(fiber as i64))
    }

    pub fn camfiber(id: ExposureId, spectro: u8, cam: char, fiber: u32) -> Self {
        Self::camera(id, spectro, cam).with(KeyValue::Int(fiber as i64))
    }

    /// Build a key from raw cells in key-column order, normalizing each.
    pub fn from_cells(granularity: Granularity, cells: &[CellValue]) -> Result<Self, QaError> {
        let columns = granularity.key_columns();
        if cells.len() != columns.len() {
            return Err(QaError::KeyArity {
                granularity,
                expected: columns.len(),
                got: cells.len(),
            });
        }
        columns
            .iter()
            .zip(cells)
            .map(|(col, cell)| {
                KeyValue::normalize(col.kind, cell).ok_or_else(|| QaError::InvalidKey {
                    column: col.name.to_string(),
                    value: format!("{:?}", cell),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RowKey)
    }

    fn with(mut self, part: KeyValue) -> Self {
        self.0.push(part);
        self
    }
}

fn text_key(c: char) -> KeyValue {
    KeyValue::Text(c.to_ascii_uppercase().to_string())
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("/"))
    }
}

// ── EntityTable ───────────────────────────────────────────────

/// Metric rows for one granularity, unique by key tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTable {
    granularity: Granularity,
    /// Metric column names, in first-seen order.
    metrics: Vec<String>,
    /// Row values aligned with `metrics`.
    rows: BTreeMap<RowKey, Vec<CellValue>>,
}

impl EntityTable {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            metrics: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn metric_columns(&self) -> &[String] {
        &self.metrics
    }

    /// Key columns followed by metric columns.
    pub fn columns(&self) -> Vec<String> {
        self.granularity
            .key_columns()
            .iter()
            .map(|k| k.name.to_string())
            .chain(self.metrics.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metric_index(&self, column: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == column)
    }

    /// Add a metric column if missing, back-filling existing rows with nulls.
    pub fn ensure_metric(&mut self, column: &str) -> Result<usize, QaError> {
        if self.granularity.is_key_column(column) {
            return Err(QaError::KeyColumnAsMetric(column.to_string()));
        }
        if let Some(idx) = self.metric_index(column) {
            return Ok(idx);
        }
        self.metrics.push(column.to_string());
        for values in self.rows.values_mut() {
            values.push(CellValue::Null);
        }
        Ok(self.metrics.len() - 1)
    }

    /// Insert a new row. Fails on a duplicate key, a key of the wrong arity
    /// or a key column among the values; a rejected row leaves the table
    /// unchanged.
    pub fn insert_row<I, S>(&mut self, key: RowKey, values: I) -> Result<(), QaError>
    where
        I: IntoIterator<Item = (S, CellValue)>,
        S: AsRef<str>,
    {
        self.check_arity(&key)?;
        if self.rows.contains_key(&key) {
            return Err(QaError::DuplicateKey {
                granularity: self.granularity,
                key: key.to_string(),
            });
        }

        let values: Vec<(S, CellValue)> = values.into_iter().collect();
        if let Some((column, _)) = values.iter().find(|(c, _)| self.granularity.is_key_column(c.as_ref())) {
            return Err(QaError::KeyColumnAsMetric(column.as_ref().to_string()));
        }

        let mut indexed = Vec::with_capacity(values.len());
        for (column, value) in values {
            indexed.push((self.ensure_metric(column.as_ref())?, value));
        }
        let mut row = vec![CellValue::Null; self.metrics.len()];
        for (idx, value) in indexed {
            row[idx] = value;
        }
        self.rows.insert(key, row);
        Ok(())
    }

    /// Mutable row values for `key`, creating a null row if absent.
    pub fn row_entry(&mut self, key: RowKey) -> Result<&mut Vec<CellValue>, QaError> {
        self.check_arity(&key)?;
        let width = self.metrics.len();
        Ok(self
            .rows
            .entry(key)
            .or_insert_with(|| vec![CellValue::Null; width]))
    }

    pub fn get(&self, key: &RowKey, column: &str) -> Option<&CellValue> {
        let idx = self.metric_index(column)?;
        self.rows.get(key).and_then(|row| row.get(idx))
    }

    /// Rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &[CellValue])> {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    fn check_arity(&self, key: &RowKey) -> Result<(), QaError> {
        let expected = self.granularity.key_columns().len();
        if key.parts().len() != expected {
            return Err(QaError::KeyArity {
                granularity: self.granularity,
                expected,
                got: key.parts().len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ExposureId {
        ExposureId::new(20220101, 1)
    }

    #[test]
    fn key_columns_are_centralized() {
        let names: Vec<&str> = Granularity::Amp.key_columns().iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["NIGHT", "EXPID", "SPECTRO", "CAM", "AMP"]);
        assert_eq!(Granularity::Exposure.key_columns().len(), 2);
        assert!(Granularity::CamFiber.is_key_column("FIBER"));
        assert!(!Granularity::Camera.is_key_column("FIBER"));
    }

    #[test]
    fn granularity_names_round_trip() {
        for g in Granularity::ALL {
            assert_eq!(Granularity::from_name(g.name()), Some(g));
        }
        assert_eq!(Granularity::from_name("PER_NOTHING"), None);
    }

    #[test]
    fn entity_labels() {
        assert_eq!(Granularity::Amp.entity_label(&RowKey::amp(id(), 0, 'b', 'a')), "B0A");
        assert_eq!(Granularity::Camera.entity_label(&RowKey::camera(id(), 3, 'r')), "R3");
        assert_eq!(Granularity::Fiber.entity_label(&RowKey::fiber(id(), 0, 123)), "123");
        assert_eq!(
            Granularity::CamFiber.entity_label(&RowKey::camfiber(id(), 1, 'z', 612)),
            "Z612"
        );
        assert_eq!(Granularity::Spectro.entity_label(&RowKey::spectro(id(), 7)), "7");
        assert_eq!(Granularity::Exposure.entity_label(&RowKey::exposure(id())), "");
    }

    #[test]
    fn text_keys_normalize_width_and_case() {
        let padded = KeyValue::normalize(KeyKind::Text, &CellValue::Text("b\0 ".into()));
        assert_eq!(padded, Some(KeyValue::Text("B".into())));
        let float_int = KeyValue::normalize(KeyKind::Int, &CellValue::Float(3.0));
        assert_eq!(float_int, Some(KeyValue::Int(3)));
        assert_eq!(KeyValue::normalize(KeyKind::Int, &CellValue::Float(3.5)), None);
        assert_eq!(KeyValue::normalize(KeyKind::Text, &CellValue::Null), None);
    }

    #[test]
    fn from_cells_matches_typed_constructor() {
        let cells = vec![
            CellValue::Int(20220101),
            CellValue::Float(1.0),
            CellValue::Int(0),
            CellValue::Text("B ".into()),
            CellValue::Text("a".into()),
        ];
        let key = RowKey::from_cells(Granularity::Amp, &cells).unwrap();
        assert_eq!(key, RowKey::amp(id(), 0, 'B', 'A'));

        let err = RowKey::from_cells(Granularity::Camera, &cells).unwrap_err();
        assert!(matches!(err, QaError::KeyArity { expected: 4, got: 5, .. }));
    }

    #[test]
    fn insert_rejects_duplicate_keys() {
        let mut table = EntityTable::new(Granularity::Camera);
        let key = RowKey::camera(id(), 0, 'b');
        table.insert_row(key.clone(), [("MEANDX", CellValue::Float(0.1))]).unwrap();
        let err = table.insert_row(key, [("MEANDX", CellValue::Float(0.2))]).unwrap_err();
        assert!(matches!(err, QaError::DuplicateKey { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn new_columns_backfill_nulls() {
        let mut table = EntityTable::new(Granularity::Camera);
        let b0 = RowKey::camera(id(), 0, 'b');
        let r0 = RowKey::camera(id(), 0, 'r');
        table.insert_row(b0.clone(), [("X", CellValue::Float(1.0))]).unwrap();
        table.insert_row(r0.clone(), [("Y", CellValue::Int(2))]).unwrap();

        assert_eq!(table.metric_columns(), &["X".to_string(), "Y".to_string()]);
        assert_eq!(table.get(&b0, "Y"), Some(&CellValue::Null));
        assert_eq!(table.get(&r0, "X"), Some(&CellValue::Null));
        assert_eq!(table.get(&r0, "Y"), Some(&CellValue::Int(2)));
    }

    #[test]
    fn key_columns_cannot_be_metrics() {
        let mut table = EntityTable::new(Granularity::Amp);
        let err = table
            .insert_row(RowKey::amp(id(), 0, 'b', 'a'), [("AMP", CellValue::Int(1))])
            .unwrap_err();
        assert!(matches!(err, QaError::KeyColumnAsMetric(_)));
    }

    #[test]
    fn rejected_row_leaves_columns_untouched() {
        let mut table = EntityTable::new(Granularity::Amp);
        table
            .insert_row(RowKey::amp(id(), 0, 'b', 'a'), [("BIAS", CellValue::Float(1.0))])
            .unwrap();

        let err = table
            .insert_row(
                RowKey::amp(id(), 0, 'b', 'b'),
                [("READNOISE", CellValue::Float(3.0)), ("CAM", CellValue::Int(1))],
            )
            .unwrap_err();
        assert!(matches!(err, QaError::KeyColumnAsMetric(ref c) if c == "CAM"));
        assert_eq!(table.metric_columns(), &["BIAS".to_string()]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn wrong_arity_key_is_rejected() {
        let mut table = EntityTable::new(Granularity::Amp);
        let err = table
            .insert_row(RowKey::camera(id(), 0, 'b'), [("X", CellValue::Int(1))])
            .unwrap_err();
        assert!(matches!(err, QaError::KeyArity { .. }));
    }
}
