use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::QaError;

/// Observing night as a `YYYYMMDD` integer.
pub type Night = u32;

/// Exposure number, unique across nights.
pub type ExpId = u32;

/// Parse an 8-digit directory name (`20220101`, `00000002`).
///
/// Anything else (wrong length, non-digits, signs) returns `None`.
pub fn parse_eight_digits(name: &str) -> Option<u32> {
    if name.len() == 8 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Convert a `YYYYMMDD` night into a calendar date.
pub fn night_to_date(night: Night) -> Result<NaiveDate, QaError> {
    NaiveDate::parse_from_str(&format!("{:08}", night), "%Y%m%d")
        .map_err(|_| QaError::MalformedIdentity(format!("night {} is not a valid YYYYMMDD date", night)))
}

/// Identity of one exposure: (night, exposure id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExposureId {
    pub night: Night,
    pub expid: ExpId,
}

impl ExposureId {
    pub fn new(night: Night, expid: ExpId) -> Self {
        Self { night, expid }
    }

    /// Build an id from a `{night}/{expid}` directory pair, rejecting malformed names.
    pub fn from_dir_names(night: &str, expid: &str) -> Option<Self> {
        Some(Self {
            night: parse_eight_digits(night)?,
            expid: parse_eight_digits(expid)?,
        })
    }

    pub fn night_dir(&self) -> String {
        format!("{:08}", self.night)
    }

    pub fn expid_dir(&self) -> String {
        format!("{:08}", self.expid)
    }

    pub fn night_date(&self) -> Result<NaiveDate, QaError> {
        night_to_date(self.night)
    }
}

impl fmt::Display for ExposureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}/{:08}", self.night, self.expid)
    }
}

/// Observation metadata for one exposure, read from its raw request file.
///
/// Immutable once the raw data has landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exposure {
    pub id: ExposureId,
    pub obstype: Option<String>,
    pub flavor: Option<String>,
    pub program: Option<String>,
    pub exptime: f64,
    /// Full header, used for covariate lookups.
    pub header: BTreeMap<String, serde_json::Value>,
}

impl Exposure {
    /// Extract the well-known fields from a raw header map.
    pub fn from_header(id: ExposureId, header: BTreeMap<String, serde_json::Value>) -> Self {
        let text = |key: &str| {
            header
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let obstype = text("OBSTYPE");
        let flavor = text("FLAVOR");
        let program = text("PROGRAM");
        let exptime = header.get("EXPTIME").and_then(json_as_f64).unwrap_or(0.0);
        Self {
            id,
            obstype,
            flavor,
            program,
            exptime,
            header,
        }
    }

    /// Observation kind used to pick applicable providers.
    ///
    /// `OBSTYPE` wins; `FLAVOR` is the fallback for older request files.
    pub fn observation_kind(&self) -> String {
        self.obstype
            .as_deref()
            .or(self.flavor.as_deref())
            .unwrap_or("UNKNOWN")
            .to_uppercase()
    }

    /// Numeric header value (numbers or numeric strings).
    pub fn covariate(&self, key: &str) -> Option<f64> {
        self.header.get(key).and_then(json_as_f64)
    }
}

fn json_as_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
