//! Raw exposure metadata from `request-{expid:08}.json`.

use std::collections::BTreeMap;
use std::fs;

use nightqa_core::{Exposure, ExposureId, RawLayout};
use tracing::debug;

use crate::error::IngestError;

/// Read the request file of one raw exposure.
pub fn read_exposure(raw: &RawLayout, id: ExposureId) -> Result<Exposure, IngestError> {
    let dir = raw.exposure_dir(id);
    if !dir.is_dir() {
        return Err(IngestError::MissingInput(dir));
    }
    let path = raw.request_path(id);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(IngestError::MissingInput(path)),
        Err(source) => return Err(IngestError::Io { path, source }),
    };
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|source| IngestError::Request {
            path: path.clone(),
            source,
        })?;
    let header: BTreeMap<String, serde_json::Value> = match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => return Err(IngestError::NotAnObject(path)),
    };

    let exposure = Exposure::from_header(id, header);
    debug!(
        night = id.night,
        expid = id.expid,
        kind = %exposure.observation_kind(),
        program = ?exposure.program,
        "read exposure request"
    );
    Ok(exposure)
}
