//! Run history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::planner::{ReconciliationPlan, ReconciliationReport};
use crate::resource::ResourceKind;

/// Current history file format version.
pub const HISTORY_VERSION: &str = "1.0";

/// Maximum number of runs kept in the history.
pub const MAX_HISTORY: usize = 50;

/// Recorded outcome of one apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier.
    pub run_id: String,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Kind that was reconciled.
    pub kind: ResourceKind,
    /// Fingerprint of the executed plan.
    pub fingerprint: String,
    /// Hash of the desired set.
    pub desired_hash: String,
    /// Successful creates.
    pub created: usize,
    /// Successful updates.
    pub updated: usize,
    /// Successful deletes.
    pub deleted: usize,
    /// Keys left unchanged.
    pub unchanged: usize,
    /// Conflicting keys.
    pub conflicts: usize,
    /// Failed operations.
    pub failed: usize,
    /// Operations never issued.
    pub skipped: usize,
    /// Execution time in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

/// History of recent runs, newest last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistory {
    /// File format version.
    pub version: String,
    /// Recorded runs.
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl RunRecord {
    /// Summarizes an executed plan.
    #[must_use]
    pub fn from_report(plan: &ReconciliationPlan, report: &ReconciliationReport) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: report.finished_at.unwrap_or_else(Utc::now),
            kind: report.kind,
            fingerprint: report.fingerprint.clone(),
            desired_hash: plan.desired_hash.clone(),
            created: report.creates_succeeded,
            updated: report.updates_succeeded,
            deleted: report.deletes_succeeded,
            unchanged: report.unchanged,
            conflicts: report.conflicts.len(),
            failed: report.failed(),
            skipped: report.skipped.len(),
            duration_ms: report.duration_ms(),
        }
    }

    /// Returns true if no operation failed or was skipped.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

impl RunHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: String::from(HISTORY_VERSION),
            runs: Vec::new(),
        }
    }

    /// Appends a run, dropping the oldest beyond [`MAX_HISTORY`].
    pub fn push(&mut self, record: RunRecord) {
        self.runs.push(record);
        if self.runs.len() > MAX_HISTORY {
            let excess = self.runs.len() - MAX_HISTORY;
            self.runs.drain(..excess);
        }
    }

    /// Returns up to `limit` runs, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<&RunRecord> {
        self.runs.iter().rev().take(limit).collect()
    }

    /// Returns the most recent run of a kind.
    #[must_use]
    pub fn last_for(&self, kind: ResourceKind) -> Option<&RunRecord> {
        self.runs.iter().rev().find(|r| r.kind == kind)
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Fields, Resource};

    fn record(kind: ResourceKind) -> RunRecord {
        let plan = ReconciliationPlan::build(
            kind,
            vec![],
            vec![Resource::desired(kind, "x", Fields::new())],
        );
        let mut report = ReconciliationReport::for_plan(&plan);
        report.finish();
        RunRecord::from_report(&plan, &report)
    }

    #[test]
    fn test_history_is_capped() {
        let mut history = RunHistory::new();
        for _ in 0..(MAX_HISTORY + 5) {
            history.push(record(ResourceKind::Role));
        }
        assert_eq!(history.runs.len(), MAX_HISTORY);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut history = RunHistory::new();
        let first = record(ResourceKind::Application);
        let second = record(ResourceKind::Role);
        history.push(first.clone());
        history.push(second.clone());

        let recent = history.recent(1);
        assert_eq!(recent, vec![&second]);
        assert_eq!(history.last_for(ResourceKind::Application), Some(&first));
    }

    #[test]
    fn test_record_from_report() {
        let run = record(ResourceKind::Application);
        assert_eq!(run.kind, ResourceKind::Application);
        assert_eq!(run.created, 0);
        assert!(run.is_success());
        assert_eq!(run.fingerprint.len(), 64);
    }
}
