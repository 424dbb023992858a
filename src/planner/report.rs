//! Reconciliation report.
//!
//! The report starts empty, is filled as operations finish, and is returned
//! once every planned operation was attempted or skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ApiError, OperationError};
use crate::resource::ResourceKind;

use super::plan::{Operation, OperationKind, ReconciliationPlan};

/// Outcome of executing a reconciliation plan.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Kind that was reconciled.
    pub kind: ResourceKind,
    /// Fingerprint of the executed plan.
    pub fingerprint: String,
    /// Number of operations in the plan.
    pub planned: usize,
    /// Successful creates.
    pub creates_succeeded: usize,
    /// Successful updates.
    pub updates_succeeded: usize,
    /// Successful deletes.
    pub deletes_succeeded: usize,
    /// Keys matched with no changes.
    pub unchanged: usize,
    /// Conflicting keys left untouched.
    pub conflicts: Vec<String>,
    /// Remote identifiers assigned to created resources, by key.
    pub created: BTreeMap<String, String>,
    /// Failed operations.
    pub failures: Vec<OperationError>,
    /// Operations that were never issued.
    pub skipped: Vec<SkippedOperation>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: Option<DateTime<Utc>>,
}

/// An operation that was planned but never issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOperation {
    /// Operation class.
    pub operation: OperationKind,
    /// Identity key.
    pub key: String,
    /// Why the operation was not issued.
    pub reason: String,
}

impl ReconciliationReport {
    /// Creates an empty report for a plan.
    #[must_use]
    pub fn for_plan(plan: &ReconciliationPlan) -> Self {
        Self {
            kind: plan.kind,
            fingerprint: plan.fingerprint.clone(),
            planned: plan.operation_count(),
            creates_succeeded: 0,
            updates_succeeded: 0,
            deletes_succeeded: 0,
            unchanged: plan.unchanged.len(),
            conflicts: plan.conflicts.iter().map(|c| c.key.clone()).collect(),
            created: BTreeMap::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Records the outcome of one operation.
    ///
    /// `Ok` carries the remote identifier assigned by a create.
    pub fn record(&mut self, operation: &Operation, outcome: Result<Option<String>, ApiError>) {
        match outcome {
            Ok(remote_id) => self.record_success(operation, remote_id),
            Err(source) => self.record_failure(OperationError {
                operation: operation.class(),
                kind: operation.kind(),
                key: operation.key().to_string(),
                remote_id: operation.remote_id().map(str::to_string),
                source,
            }),
        }
    }

    /// Records a successful operation.
    pub fn record_success(&mut self, operation: &Operation, remote_id: Option<String>) {
        match operation.class() {
            OperationKind::Create => {
                self.creates_succeeded += 1;
                if let Some(id) = remote_id {
                    self.created.insert(operation.key().to_string(), id);
                }
            }
            OperationKind::Update => self.updates_succeeded += 1,
            OperationKind::Delete => self.deletes_succeeded += 1,
        }
    }

    /// Records a failed operation.
    pub fn record_failure(&mut self, error: OperationError) {
        self.failures.push(error);
    }

    /// Records an operation that was not issued.
    pub fn record_skipped(&mut self, operation: &Operation, reason: impl Into<String>) {
        self.skipped.push(SkippedOperation {
            operation: operation.class(),
            key: operation.key().to_string(),
            reason: reason.into(),
        });
    }

    /// Folds a partial report into this one.
    pub fn merge(&mut self, other: Self) {
        self.creates_succeeded += other.creates_succeeded;
        self.updates_succeeded += other.updates_succeeded;
        self.deletes_succeeded += other.deletes_succeeded;
        self.created.extend(other.created);
        self.failures.extend(other.failures);
        self.skipped.extend(other.skipped);
    }

    /// Sorts failures and skipped operations and stamps the finish time.
    pub fn finish(&mut self) {
        self.failures
            .sort_by(|a, b| (a.operation, &a.key).cmp(&(b.operation, &b.key)));
        self.skipped
            .sort_by(|a, b| (a.operation, &a.key).cmp(&(b.operation, &b.key)));
        self.finished_at = Some(Utc::now());
    }

    /// Returns the number of successful operations.
    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.creates_succeeded + self.updates_succeeded + self.deletes_succeeded
    }

    /// Returns the number of failed operations.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if any operation failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns true if every planned operation is accounted for exactly once.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded() + self.failed() + self.skipped.len() == self.planned
    }

    /// Returns the failure recorded for a key, if any.
    #[must_use]
    pub fn failure_for(&self, key: &str) -> Option<&OperationError> {
        self.failures.iter().find(|f| f.key == key)
    }

    /// Returns the elapsed execution time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            self.kind,
            self.creates_succeeded,
            self.updates_succeeded,
            self.deletes_succeeded,
            self.unchanged,
            self.failed()
        )?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        if !self.conflicts.is_empty() {
            write!(f, ", {} conflicts", self.conflicts.len())?;
        }
        Ok(())
    }
}
