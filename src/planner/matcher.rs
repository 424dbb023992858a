//! Matching of existing and desired resources by identity key.
//!
//! Both sets are indexed by key once per run; every key is then classified
//! exactly once. Keys are compared as exact, case-sensitive strings.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::resource::Resource;

use super::plan::{Conflict, ConflictReason};

/// Pairs existing and desired resources and classifies each key.
#[derive(Debug, Default, Clone, Copy)]
pub struct Matcher;

/// An existing resource matched with its desired counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    /// Resource as it exists remotely (supplies the remote identifier).
    pub existing: Resource,
    /// Resource as declared (supplies the target field values).
    pub desired: Resource,
}

/// Outcome of matching, before differencing.
///
/// Every input resource appears in exactly one bucket. Each bucket is sorted
/// by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Desired resources with no existing counterpart.
    pub creates: Vec<Resource>,
    /// Keys present on both sides, candidates for an update.
    pub candidates: Vec<MatchedPair>,
    /// Existing resources with no desired counterpart.
    pub deletes: Vec<Resource>,
    /// Keys that cannot be resolved unambiguously.
    pub conflicts: Vec<Conflict>,
}

/// Identity-key index over one side of the reconciliation.
type KeyIndex = HashMap<String, Vec<Resource>>;

impl Matcher {
    /// Creates a new matcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies every key of `existing` and `desired`.
    #[must_use]
    pub fn classify(&self, existing: Vec<Resource>, desired: Vec<Resource>) -> Classification {
        let desired_index = Self::index(desired);
        let mut existing_index = Self::index(existing);
        let mut result = Classification::default();

        for (key, wanted) in desired_index {
            let current = existing_index.remove(&key).unwrap_or_default();
            Self::classify_key(key, wanted, current, &mut result);
        }

        for (key, current) in existing_index {
            Self::classify_orphan(key, current, &mut result);
        }

        result.creates.sort_by(|a, b| a.key.cmp(&b.key));
        result.candidates.sort_by(|a, b| a.desired.key.cmp(&b.desired.key));
        result.deletes.sort_by(|a, b| a.key.cmp(&b.key));
        result.conflicts.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(
            "Matched: {} to create, {} candidates, {} to delete, {} conflicts",
            result.creates.len(),
            result.candidates.len(),
            result.deletes.len(),
            result.conflicts.len()
        );

        result
    }

    /// Builds the key index, keeping duplicates in input order.
    fn index(resources: Vec<Resource>) -> KeyIndex {
        let mut index: KeyIndex = HashMap::with_capacity(resources.len());
        for resource in resources {
            index.entry(resource.key.clone()).or_default().push(resource);
        }
        index
    }

    /// Classifies a key that is declared in the desired set.
    fn classify_key(
        key: String,
        mut wanted: Vec<Resource>,
        mut current: Vec<Resource>,
        result: &mut Classification,
    ) {
        let reason = match (wanted.len() > 1, current.len() > 1) {
            (true, true) => Some(ConflictReason::DuplicateBoth),
            (true, false) => Some(ConflictReason::DuplicateDesired),
            (false, true) => Some(ConflictReason::DuplicateExisting),
            (false, false) => None,
        };

        if let Some(reason) = reason {
            Self::push_conflict(key, reason, wanted, current, result);
            return;
        }

        let (Some(desired), existing) = (wanted.pop(), current.pop()) else {
            return;
        };

        match existing {
            None => {
                debug!("{} '{key}' is new", desired.kind);
                result.creates.push(desired);
            }
            Some(existing) if existing.remote_id.is_none() => {
                Self::push_conflict(
                    key,
                    ConflictReason::MissingRemoteId,
                    vec![desired],
                    vec![existing],
                    result,
                );
            }
            Some(existing) => result.candidates.push(MatchedPair { existing, desired }),
        }
    }

    /// Classifies a key that only exists remotely.
    fn classify_orphan(key: String, mut current: Vec<Resource>, result: &mut Classification) {
        if current.len() > 1 {
            Self::push_conflict(key, ConflictReason::DuplicateExisting, vec![], current, result);
            return;
        }

        let Some(existing) = current.pop() else {
            return;
        };

        if existing.remote_id.is_none() {
            Self::push_conflict(
                key,
                ConflictReason::MissingRemoteId,
                vec![],
                vec![existing],
                result,
            );
        } else {
            debug!("{} '{key}' is no longer declared", existing.kind);
            result.deletes.push(existing);
        }
    }

    fn push_conflict(
        key: String,
        reason: ConflictReason,
        desired: Vec<Resource>,
        existing: Vec<Resource>,
        result: &mut Classification,
    ) {
        warn!(
            "Conflict on '{key}': {reason} ({} desired, {} existing)",
            desired.len(),
            existing.len()
        );
        result.conflicts.push(Conflict {
            key,
            reason,
            desired,
            existing,
        });
    }
}
