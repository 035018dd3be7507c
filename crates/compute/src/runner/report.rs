use std::time::Duration;

use chrono::{DateTime, Utc};
use nightqa_core::Granularity;
use serde::{Deserialize, Serialize};

/// What happened to one provider for one exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderOutcome {
    /// Produced a table.
    Computed { rows: usize },
    /// Filtered out by observation kind or `--only`.
    NotApplicable,
    /// Ran, but its input products were absent.
    Empty,
    /// Returned an error or panicked; its table is absent from the merge.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRun {
    pub provider: String,
    pub granularity: Granularity,
    #[serde(flatten)]
    pub outcome: ProviderOutcome,
    pub duration_ms: u64,
}

impl ProviderRun {
    pub fn new(provider: &str, granularity: Granularity, outcome: ProviderOutcome, duration: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            granularity,
            outcome,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, ProviderOutcome::Failed { .. })
    }
}

/// Per-exposure record of every provider's outcome, persisted with the
/// output manifest so failures remain queryable after the logs rotate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub observation_kind: String,
    pub started_at: DateTime<Utc>,
    /// Worker threads used; 1 means providers ran serially.
    pub workers: usize,
    pub providers: Vec<ProviderRun>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProviderRun> {
        self.providers.iter().filter(|p| p.failed())
    }

    pub fn computed(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| matches!(p.outcome, ProviderOutcome::Computed { .. }))
            .count()
    }
}
