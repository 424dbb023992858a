//! Field-level differencing of matched resources.
//!
//! Only fields declared on the desired resource are compared. Fields that
//! exist remotely but are not declared are never touched, so a patch can
//! only overwrite declared fields.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::resource::{FieldValue, Fields, Resource};

/// Minimal set of field changes for one resource.
///
/// Never contains a field whose value is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Patch(Fields);

/// A single changed field, with its previous value for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value currently on the remote side, if any.
    pub old_value: Option<FieldValue>,
    /// Declared value.
    pub new_value: FieldValue,
}

/// Computes patches between existing and desired resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct Differencer;

impl Differencer {
    /// Creates a new differencer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the patch turning `existing` into `desired` on declared fields.
    #[must_use]
    pub fn diff(&self, existing: &Resource, desired: &Resource) -> Patch {
        let patch: Fields = self
            .changes(existing, desired)
            .into_iter()
            .map(|change| (change.field, change.new_value))
            .collect();
        Patch(patch)
    }

    /// Lists every declared field whose value differs, in field order.
    #[must_use]
    pub fn changes(&self, existing: &Resource, desired: &Resource) -> Vec<FieldChange> {
        let changes: Vec<FieldChange> = desired
            .fields
            .iter()
            .filter_map(|(field, new_value)| {
                let old_value = existing.fields.get(field);
                if old_value.is_some_and(|old| values_equal(old, new_value)) {
                    return None;
                }
                Some(FieldChange {
                    field: field.clone(),
                    old_value: old_value.cloned(),
                    new_value: new_value.clone(),
                })
            })
            .collect();

        debug!(
            "{} '{}': {} changed field(s)",
            desired.kind,
            desired.key,
            changes.len()
        );
        changes
    }
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new() -> Self {
        Self(Fields::new())
    }

    /// Adds a changed field.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Gets the new value of a changed field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Returns true if `field` is part of the patch.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Returns the changed fields.
    #[must_use]
    pub const fn fields(&self) -> &Fields {
        &self.0
    }
}

impl From<Fields> for Patch {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.keys().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Compares two field values structurally.
///
/// Numbers compare by value, so `1` and `1.0` are equal. Lists compare
/// element by element in order, objects key by key.
#[must_use]
pub fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => numbers_equal(x, y),
        (FieldValue::Array(xs), FieldValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (FieldValue::Object(xs), FieldValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

#[allow(clippy::float_cmp)]
fn numbers_equal(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    if x.is_f64() || y.is_f64() {
        matches!((x.as_f64(), y.as_f64()), (Some(a), Some(b)) if a == b)
    } else {
        x == y
    }
}
