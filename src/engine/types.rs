//! Engine types
//!
//! Configuration and run summaries for the sync engine.

use serde::Serialize;

/// Configuration for a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Reports processed at the same time
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set concurrency
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Concurrency clamped to `1..=pool_size`
    pub fn effective_concurrency(&self, pool_size: usize) -> usize {
        self.concurrency.clamp(1, pool_size.max(1))
    }
}

/// How one report ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeResult {
    /// All rows reached the sink
    Succeeded {
        /// Rows forwarded
        rows: u64,
    },
    /// The report was abandoned
    Failed {
        /// Why
        reason: String,
    },
}

/// Outcome of one report spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    /// Stream name
    pub stream: String,
    /// Account the report was run for
    pub account_id: String,
    /// Platform job id, once submitted
    pub job_id: Option<String>,
    /// Result
    #[serde(flatten)]
    pub result: OutcomeResult,
}

impl ReportOutcome {
    /// Whether the report succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Succeeded { .. })
    }

    /// Rows forwarded, zero for failures
    pub fn rows(&self) -> u64 {
        match self.result {
            OutcomeResult::Succeeded { rows } => rows,
            OutcomeResult::Failed { .. } => 0,
        }
    }
}

/// Result of removing completed jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Job ids removed
    pub removed: Vec<String>,
    /// `(job id, error)` for removals that failed
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    /// Merge another report into this one
    pub fn merge(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Rows forwarded to the sink
    pub rows: u64,
    /// Reports that succeeded
    pub reports_succeeded: usize,
    /// Reports that failed
    pub reports_failed: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Summarize outcomes
    pub fn from_outcomes(outcomes: &[ReportOutcome], duration_ms: u64) -> Self {
        let reports_succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            rows: outcomes.iter().map(ReportOutcome::rows).sum(),
            reports_succeeded,
            reports_failed: outcomes.len() - reports_succeeded,
            duration_ms,
        }
    }
}

/// Summary of a sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// One entry per spec, in spec order
    pub outcomes: Vec<ReportOutcome>,
    /// Job cleanup
    pub cleanup: CleanupReport,
    /// Totals
    pub stats: SyncStats,
}

impl SyncReport {
    /// `(stream, reason)` for every failed report
    pub fn failures(&self) -> Vec<(String, String)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.result {
                OutcomeResult::Failed { reason } => Some((o.stream.clone(), reason.clone())),
                OutcomeResult::Succeeded { .. } => None,
            })
            .collect()
    }
}
