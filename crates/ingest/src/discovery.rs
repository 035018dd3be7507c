//! Discovery of raw exposures that still need processing.
//!
//! Every call re-walks the raw tree; nothing is cached between calls so a
//! missed filesystem event never hides an exposure for good.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use nightqa_core::exposure::parse_eight_digits;
use nightqa_core::{ExposureId, Night, OutputLayout, RawLayout};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::processed::ProcessedSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    /// Oldest night first; skips exposures whose output artifact exists.
    #[default]
    CatchUp,
    /// Only the most recent night holding raw data.
    LiveTail,
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "catchup" | "catch-up" => Ok(DiscoveryMode::CatchUp),
            "live" | "live-tail" | "livetail" => Ok(DiscoveryMode::LiveTail),
            other => Err(format!("unknown discovery mode '{}'", other)),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMode::CatchUp => f.write_str("catchup"),
            DiscoveryMode::LiveTail => f.write_str("live"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExposureDiscovery {
    raw: RawLayout,
    outputs: OutputLayout,
    start_night: Option<Night>,
}

impl ExposureDiscovery {
    pub fn new(raw: RawLayout, outputs: OutputLayout) -> Self {
        Self {
            raw,
            outputs,
            start_night: None,
        }
    }

    /// Ignore nights before `night`.
    pub fn with_start_night(mut self, night: Option<Night>) -> Self {
        self.start_night = night;
        self
    }

    /// Night directories at or after the start night, ascending.
    pub fn nights(&self) -> Vec<Night> {
        eight_digit_children(self.raw.base())
            .into_iter()
            .filter(|n| self.start_night.map_or(true, |start| *n >= start))
            .collect()
    }

    /// Exposure directories of one night, ascending.
    pub fn exposures(&self, night: Night) -> Vec<ExposureId> {
        eight_digit_children(&self.raw.night_dir(night))
            .into_iter()
            .map(|expid| ExposureId::new(night, expid))
            .collect()
    }

    pub fn has_raw_marker(&self, id: ExposureId) -> bool {
        self.raw.marker_path(id).is_file()
    }

    pub fn has_output(&self, id: ExposureId) -> bool {
        self.outputs.artifact_path(id).is_file()
    }

    /// Next exposure to process, or `None` to poll again later.
    pub fn next(&self, mode: DiscoveryMode, processed: &ProcessedSet) -> Option<ExposureId> {
        let found = match mode {
            DiscoveryMode::CatchUp => self.next_catch_up(processed),
            DiscoveryMode::LiveTail => self.next_live(processed),
        };
        match found {
            Some(id) => debug!(night = id.night, expid = id.expid, %mode, "discovered exposure"),
            None => trace!(%mode, "nothing to process"),
        }
        found
    }

    fn next_catch_up(&self, processed: &ProcessedSet) -> Option<ExposureId> {
        self.nights().into_iter().find_map(|night| {
            self.exposures(night)
                .into_iter()
                .find(|id| self.has_raw_marker(*id) && !self.has_output(*id) && !processed.contains(*id))
        })
    }

    fn next_live(&self, processed: &ProcessedSet) -> Option<ExposureId> {
        for night in self.nights().into_iter().rev() {
            let landed: Vec<ExposureId> = self
                .exposures(night)
                .into_iter()
                .filter(|id| self.has_raw_marker(*id))
                .collect();
            if landed.is_empty() {
                continue;
            }
            return landed.into_iter().find(|id| !processed.contains(*id));
        }
        None
    }
}

/// Immediate subdirectories named with exactly eight digits, ascending.
/// Anything else, including unreadable entries, is skipped.
fn eight_digit_children(dir: &Path) -> Vec<u32> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut found: Vec<u32> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let parsed = e.file_name().to_str().and_then(parse_eight_digits);
            if parsed.is_none() {
                trace!(path = %e.path().display(), "skipping malformed directory name");
            }
            parsed
        })
        .collect();
    found.sort_unstable();
    found
}
