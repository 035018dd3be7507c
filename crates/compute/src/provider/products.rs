//! Readers for the per-camera intermediate products written by the
//! external processing step.
//!
//! Products live in one directory per exposure, one JSON document per
//! camera, named `{kind}-{camera}-{expid:08}.json` where `camera` is an
//! arm letter followed by the spectrograph number (`b0`, `z9`).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use nightqa_core::ExpId;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::task::ProviderError;

pub const PREPROC: &str = "preproc";
pub const PSF: &str = "psf";
pub const FRAME: &str = "frame";

/// Camera identity: arm letter plus spectrograph number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Camera {
    pub arm: char,
    pub spectro: u8,
}

impl Camera {
    /// Parse `b0`, `R3`, ...; the arm is normalized to lowercase.
    pub fn parse(name: &str) -> Option<Camera> {
        let mut chars = name.chars();
        let arm = chars.next().filter(|c| c.is_ascii_alphabetic())?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Camera {
            arm: arm.to_ascii_lowercase(),
            spectro: digits.parse().ok()?,
        })
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.arm, self.spectro)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmpStats {
    pub bias: f64,
    pub readnoise: f64,
    #[serde(default)]
    pub cosmic_pixels: u64,
    #[serde(default)]
    pub npix: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreprocProduct {
    pub camera: String,
    pub amps: BTreeMap<String, AmpStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PsfProduct {
    pub camera: String,
    #[serde(default)]
    pub dx: Vec<f64>,
    #[serde(default)]
    pub dy: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameProduct {
    pub camera: String,
    pub fibers: Vec<u32>,
    #[serde(default)]
    pub integrated_flux: Vec<f64>,
    #[serde(default)]
    pub sky_flux: Vec<f64>,
}

impl FrameProduct {
    /// Per-fiber values of one array, checked against the fiber list.
    pub fn per_fiber<'a>(&'a self, values: &'a [f64], what: &str) -> Result<impl Iterator<Item = (u32, f64)> + 'a, ProviderError> {
        if values.len() != self.fibers.len() {
            return Err(ProviderError::Invalid(format!(
                "frame {}: {} has {} values for {} fibers",
                self.camera,
                what,
                values.len(),
                self.fibers.len()
            )));
        }
        Ok(self.fibers.iter().copied().zip(values.iter().copied()))
    }
}

pub fn product_file_name(kind: &str, camera: Camera, expid: ExpId) -> String {
    format!("{}-{}-{:08}.json", kind, camera, expid)
}

/// All products of one kind in `dir`, sorted by camera.
///
/// Files whose camera part does not parse are ignored.
pub fn list_products(dir: &Path, kind: &str, expid: ExpId) -> Result<Vec<(Camera, PathBuf)>, ProviderError> {
    let entries = fs::read_dir(dir).map_err(|source| io_error(dir, source))?;
    let prefix = format!("{}-", kind);
    let suffix = format!("-{:08}.json", expid);

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|source| io_error(dir, source))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(camera) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .and_then(Camera::parse)
        else {
            continue;
        };
        found.push((camera, path));
    }
    found.sort();
    Ok(found)
}

/// Load and parse every product of one kind.
pub fn load_products<T: DeserializeOwned>(dir: &Path, kind: &str, expid: ExpId) -> Result<Vec<(Camera, T)>, ProviderError> {
    list_products(dir, kind, expid)?
        .into_iter()
        .map(|(camera, path)| Ok((camera, load_product(&path)?)))
        .collect()
}

pub fn load_product<T: DeserializeOwned>(path: &Path) -> Result<T, ProviderError> {
    let contents = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&contents).map_err(|source| ProviderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path, source: std::io::Error) -> ProviderError {
    ProviderError::Io {
        path: path.to_path_buf(),
        source,
    }
}
