//! Planning and execution of reconciliation.
//!
//! This module matches existing and desired resources, computes field-level
//! patches, builds the reconciliation plan and executes it.

mod diff;
mod executor;
mod matcher;
mod plan;
mod report;

pub use diff::{Differencer, FieldChange, Patch, values_equal};
pub use executor::{DEFAULT_CONCURRENCY, Executor, SKIP_CANCELLED};
pub use matcher::{Classification, MatchedPair, Matcher};
pub use plan::{
    Conflict, ConflictReason, Operation, OperationKind, PlannedDelete, PlannedUpdate,
    ReconciliationPlan,
};
pub use report::{ReconciliationReport, SkippedOperation};
