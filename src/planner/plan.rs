//! Reconciliation plan types and construction.
//!
//! A plan is an immutable snapshot computed once from the existing and
//! desired sets. It holds four disjoint buckets (creates, updates, deletes,
//! conflicts) plus the keys that matched without changes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

use crate::config::{ConfigHasher, GuardrailsConfig};
use crate::resource::{Fields, Resource, ResourceKind};

use super::diff::{Differencer, FieldChange, Patch};
use super::matcher::{Classification, Matcher};

/// A complete reconciliation plan for one resource kind.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationPlan {
    /// Kind being reconciled.
    pub kind: ResourceKind,
    /// When the plan was computed.
    pub created_at: DateTime<Utc>,
    /// Deterministic hash of the planned operations and conflicts.
    pub fingerprint: String,
    /// Hash of the desired set the plan was computed from.
    pub desired_hash: String,
    /// Number of existing resources.
    pub existing_count: usize,
    /// Number of desired resources.
    pub desired_count: usize,
    /// Resources to create, sorted by key.
    pub creates: Vec<Resource>,
    /// Resources to patch, sorted by key.
    pub updates: Vec<PlannedUpdate>,
    /// Resources to delete, sorted by key.
    pub deletes: Vec<PlannedDelete>,
    /// Keys that matched with no changes.
    pub unchanged: Vec<String>,
    /// Keys that could not be resolved.
    pub conflicts: Vec<Conflict>,
}

/// A planned patch of an existing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    /// Identity key.
    pub key: String,
    /// Remote identifier of the existing resource.
    pub remote_id: String,
    /// Fields to overwrite.
    pub patch: Patch,
    /// Changed fields with their previous values.
    pub changes: Vec<FieldChange>,
}

/// A planned removal of an existing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDelete {
    /// Identity key.
    pub key: String,
    /// Remote identifier of the existing resource.
    pub remote_id: String,
}

/// A key that cannot be resolved automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Identity key.
    pub key: String,
    /// Why the key is ambiguous.
    pub reason: ConflictReason,
    /// Desired resources carrying the key.
    pub desired: Vec<Resource>,
    /// Existing resources carrying the key.
    pub existing: Vec<Resource>,
}

/// Reasons a key ends up in the conflicts set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The key is declared more than once.
    DuplicateDesired,
    /// Several existing resources share the key.
    DuplicateExisting,
    /// The key is duplicated on both sides.
    DuplicateBoth,
    /// An existing resource has no remote identifier.
    MissingRemoteId,
}

/// Operation classes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a resource.
    Create,
    /// Patch a resource.
    Update,
    /// Delete a resource.
    Delete,
}

/// A single remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Create the resource.
    Create(Resource),
    /// Patch an existing resource.
    Update {
        /// Kind of the resource.
        kind: ResourceKind,
        /// Identity key.
        key: String,
        /// Remote identifier.
        remote_id: String,
        /// Fields to overwrite.
        patch: Patch,
    },
    /// Delete an existing resource.
    Delete {
        /// Kind of the resource.
        kind: ResourceKind,
        /// Identity key.
        key: String,
        /// Remote identifier.
        remote_id: String,
    },
}

impl ReconciliationPlan {
    /// Matches, classifies and differences `existing` against `desired`.
    #[must_use]
    pub fn build(kind: ResourceKind, existing: Vec<Resource>, desired: Vec<Resource>) -> Self {
        let existing_count = existing.len();
        let desired_count = desired.len();
        let desired_hash = ConfigHasher::new().hash_desired(&desired);

        let classification = Matcher::new().classify(existing, desired);
        Self::from_classification(
            kind,
            classification,
            existing_count,
            desired_count,
            desired_hash,
        )
    }

    /// Refines a classification into a plan.
    ///
    /// Candidates whose patch is empty are demoted to `unchanged`.
    #[must_use]
    pub fn from_classification(
        kind: ResourceKind,
        classification: Classification,
        existing_count: usize,
        desired_count: usize,
        desired_hash: String,
    ) -> Self {
        let differencer = Differencer::new();
        let mut updates = Vec::new();
        let mut unchanged = Vec::new();

        for pair in classification.candidates {
            let changes = differencer.changes(&pair.existing, &pair.desired);
            let Some(remote_id) = pair.existing.remote_id else {
                continue;
            };

            if changes.is_empty() {
                unchanged.push(pair.desired.key);
                continue;
            }

            let patch: Patch = changes
                .iter()
                .map(|c| (c.field.clone(), c.new_value.clone()))
                .collect::<Fields>()
                .into();

            updates.push(PlannedUpdate {
                key: pair.desired.key,
                remote_id,
                patch,
                changes,
            });
        }

        let deletes: Vec<PlannedDelete> = classification
            .deletes
            .into_iter()
            .filter_map(|resource| {
                resource.remote_id.map(|remote_id| PlannedDelete {
                    key: resource.key,
                    remote_id,
                })
            })
            .collect();

        let mut plan = Self {
            kind,
            created_at: Utc::now(),
            fingerprint: String::new(),
            desired_hash,
            existing_count,
            desired_count,
            creates: classification.creates,
            updates,
            deletes,
            unchanged,
            conflicts: classification.conflicts,
        };
        plan.fingerprint = plan.compute_fingerprint();

        info!(
            "Plan for {kind}: {} to create, {} to update, {} to delete, {} unchanged, {} conflicts",
            plan.creates.len(),
            plan.updates.len(),
            plan.deletes.len(),
            plan.unchanged.len(),
            plan.conflicts.len()
        );

        plan
    }

    /// Hashes the ordered operations and conflicts, excluding timestamps.
    fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.section().as_bytes());

        for operation in self.operations() {
            let encoded = serde_json::to_vec(&operation).unwrap_or_default();
            hasher.update((encoded.len() as u64).to_be_bytes());
            hasher.update(&encoded);
        }

        for conflict in &self.conflicts {
            hasher.update(conflict.key.as_bytes());
            hasher.update([0u8]);
            hasher.update(conflict.reason.to_string().as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Returns every operation, creates first, then updates, then deletes.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        [OperationKind::Create, OperationKind::Update, OperationKind::Delete]
            .into_iter()
            .flat_map(|class| self.operations_of(class))
            .collect()
    }

    /// Returns the operations of one class, sorted by key.
    #[must_use]
    pub fn operations_of(&self, class: OperationKind) -> Vec<Operation> {
        match class {
            OperationKind::Create => self.creates.iter().cloned().map(Operation::Create).collect(),
            OperationKind::Update => self
                .updates
                .iter()
                .map(|u| Operation::Update {
                    kind: self.kind,
                    key: u.key.clone(),
                    remote_id: u.remote_id.clone(),
                    patch: u.patch.clone(),
                })
                .collect(),
            OperationKind::Delete => self
                .deletes
                .iter()
                .map(|d| Operation::Delete {
                    kind: self.kind,
                    key: d.key.clone(),
                    remote_id: d.remote_id.clone(),
                })
                .collect(),
        }
    }

    /// Returns true if the plan requires no remote operation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Returns the number of remote operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Returns true if some keys could not be resolved.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Returns the conflicting keys, comma separated.
    #[must_use]
    pub fn conflict_keys(&self) -> String {
        self.conflicts
            .iter()
            .map(|c| c.key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns true if the plan must be confirmed before execution.
    ///
    /// An empty desired set deleting existing resources always needs
    /// confirmation unless explicitly allowed; otherwise the share of deleted
    /// existing resources is compared to the configured ratio.
    #[must_use]
    pub fn requires_confirmation(&self, guardrails: &GuardrailsConfig) -> bool {
        !self.guardrail_violations(guardrails).is_empty()
    }

    /// Describes every guardrail the plan exceeds.
    #[must_use]
    pub fn guardrail_violations(&self, guardrails: &GuardrailsConfig) -> Vec<String> {
        let mut violations = Vec::new();

        if self.deletes.is_empty() || self.existing_count == 0 {
            return violations;
        }

        if self.desired_count == 0 {
            if !guardrails.allow_empty_desired {
                violations.push(format!(
                    "Desired {} set is empty: all {} existing resources will be deleted",
                    self.kind, self.existing_count
                ));
            }
            return violations;
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = self.deletes.len() as f64 / self.existing_count as f64;
        if ratio > guardrails.max_delete_ratio {
            violations.push(format!(
                "Plan deletes {} of {} existing {} resources ({:.0}%), above the {:.0}% limit",
                self.deletes.len(),
                self.existing_count,
                self.kind,
                ratio * 100.0,
                guardrails.max_delete_ratio * 100.0
            ));
        }

        violations
    }
}

impl Operation {
    /// Returns the operation class.
    #[must_use]
    pub const fn class(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Returns the kind of the affected resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Create(resource) => resource.kind,
            Self::Update { kind, .. } | Self::Delete { kind, .. } => *kind,
        }
    }

    /// Returns the identity key of the affected resource.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Create(resource) => &resource.key,
            Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Returns the remote identifier, if the resource already exists.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Create(resource) => resource.remote_id.as_deref(),
            Self::Update { remote_id, .. } | Self::Delete { remote_id, .. } => Some(remote_id),
        }
    }

    /// Returns a human-readable description of the operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Create(resource) => format!("Create {} '{}'", resource.kind, resource.key),
            Self::Update { kind, key, patch, .. } => {
                format!("Update {kind} '{key}' ({patch})")
            }
            Self::Delete { kind, key, remote_id } => {
                format!("Delete {kind} '{key}' ({remote_id})")
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateDesired => "duplicate desired name",
            Self::DuplicateExisting => "duplicate existing name",
            Self::DuplicateBoth => "duplicate name on both sides",
            Self::MissingRemoteId => "existing resource has no remote id",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': {} ({} desired, {} existing)",
            self.key,
            self.reason,
            self.desired.len(),
            self.existing.len()
        )
    }
}

impl fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() && self.conflicts.is_empty() {
            return write!(f, "No changes required for {}", self.kind);
        }

        writeln!(
            f,
            "Reconciliation Plan for {} ({} operations):",
            self.kind,
            self.operation_count()
        )?;
        for (i, operation) in self.operations().iter().enumerate() {
            writeln!(f, "  {}. {operation}", i + 1)?;
        }

        if !self.conflicts.is_empty() {
            writeln!(f, "\nConflicts:")?;
            for conflict in &self.conflicts {
                writeln!(f, "  - {conflict}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KIND: ResourceKind = ResourceKind::Application;

    fn existing(name: &str, id: &str) -> Resource {
        Resource::existing(KIND, name, id, Fields::new())
    }

    fn desired(name: &str) -> Resource {
        Resource::desired(KIND, name, Fields::new())
    }

    #[test]
    fn test_disjoint_sets_plan() {
        let existing_set = vec![existing("x", "1"), existing("y", "2")];
        let desired_set = vec![desired("a"), desired("b")];

        let plan = ReconciliationPlan::build(KIND, existing_set, desired_set.clone());

        assert_eq!(plan.creates, desired_set);
        assert_eq!(
            plan.deletes,
            vec![
                PlannedDelete { key: String::from("x"), remote_id: String::from("1") },
                PlannedDelete { key: String::from("y"), remote_id: String::from("2") },
            ]
        );
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn test_identical_sets_produce_no_operations() {
        let existing_set = vec![
            existing("a", "1").with_field("description", "same"),
            existing("b", "2").with_field("app_type", "spa"),
        ];
        let desired_set = vec![
            desired("a").with_field("description", "same"),
            desired("b").with_field("app_type", "spa"),
        ];

        let plan = ReconciliationPlan::build(KIND, existing_set, desired_set);

        assert!(plan.is_empty());
        assert!(plan.updates.is_empty());
        assert_eq!(plan.unchanged, vec![String::from("a"), String::from("b")]);
    }

    #[test]
    fn test_mixed_scenario() {
        let existing_set = vec![
            existing("A", "id-a").with_field("version", "v1"),
            existing("B", "id-b"),
        ];
        let desired_set = vec![desired("A").with_field("version", "v2"), desired("C")];

        let plan = ReconciliationPlan::build(KIND, existing_set, desired_set);

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].key, "C");

        assert_eq!(plan.updates.len(), 1);
        let update = &plan.updates[0];
        assert_eq!(update.key, "A");
        assert_eq!(update.remote_id, "id-a");
        assert_eq!(update.patch.len(), 1);
        assert_eq!(update.patch.get("version"), Some(&json!("v2")));
        assert_eq!(update.changes[0].old_value, Some(json!("v1")));

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].key, "B");
    }

    #[test]
    fn test_partial_field_patch() {
        let existing_set = vec![existing("A", "1")
            .with_field("display", "old")
            .with_field("description", "remote only")];
        let desired_set = vec![desired("A").with_field("display", "new")];

        let plan = ReconciliationPlan::build(KIND, existing_set, desired_set);

        let patch = &plan.updates[0].patch;
        assert!(patch.contains("display"));
        assert!(!patch.contains("description"));
    }

    #[test]
    fn test_duplicate_desired_never_created_or_updated() {
        let plan = ReconciliationPlan::build(
            KIND,
            vec![],
            vec![desired("app-a"), desired("app-a")],
        );

        assert!(plan.creates.iter().all(|r| r.key != "app-a"));
        assert!(plan.updates.iter().all(|u| u.key != "app-a"));
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflict_keys(), "app-a");
    }

    #[test]
    fn test_operations_ordered_by_class_then_key() {
        let existing_set = vec![
            existing("z-update", "1").with_field("v", 1),
            existing("m-delete", "2"),
            existing("a-delete", "3"),
        ];
        let desired_set = vec![
            desired("z-update").with_field("v", 2),
            desired("b-create"),
            desired("a-create"),
        ];

        let plan = ReconciliationPlan::build(KIND, existing_set, desired_set);
        let order: Vec<(OperationKind, String)> = plan
            .operations()
            .iter()
            .map(|op| (op.class(), op.key().to_string()))
            .collect();

        assert_eq!(
            order,
            vec![
                (OperationKind::Create, String::from("a-create")),
                (OperationKind::Create, String::from("b-create")),
                (OperationKind::Update, String::from("z-update")),
                (OperationKind::Delete, String::from("a-delete")),
                (OperationKind::Delete, String::from("m-delete")),
            ]
        );
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let build = || {
            ReconciliationPlan::build(
                KIND,
                vec![existing("b", "2"), existing("a", "1").with_field("v", 1)],
                vec![desired("c"), desired("a").with_field("v", 2)],
            )
        };

        let first = build();
        let second = build();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.operations(), second.operations());
    }

    #[test]
    fn test_empty_desired_requires_confirmation() {
        let plan = ReconciliationPlan::build(
            KIND,
            vec![existing("a", "1"), existing("b", "2")],
            vec![],
        );
        assert_eq!(plan.deletes.len(), 2);

        let guardrails = GuardrailsConfig::default();
        assert!(plan.requires_confirmation(&guardrails));

        let permissive = GuardrailsConfig {
            allow_empty_desired: true,
            ..GuardrailsConfig::default()
        };
        assert!(!plan.requires_confirmation(&permissive));
    }

    #[test]
    fn test_delete_ratio_guardrail() {
        let existing_set = vec![
            existing("a", "1"),
            existing("b", "2"),
            existing("c", "3"),
            existing("d", "4"),
        ];

        let small = ReconciliationPlan::build(
            KIND,
            existing_set.clone(),
            vec![desired("a"), desired("b"), desired("c")],
        );
        assert!(!small.requires_confirmation(&GuardrailsConfig::default()));

        let large = ReconciliationPlan::build(KIND, existing_set, vec![desired("a")]);
        let violations = large.guardrail_violations(&GuardrailsConfig::default());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("3 of 4"));
    }
}
