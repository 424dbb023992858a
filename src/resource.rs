//! Resource model shared by the loader, the fetcher and the planner.
//!
//! A [`Resource`] is identified by its name (the identity key) within a
//! [`ResourceKind`]. Desired resources never carry a remote identifier;
//! existing resources listed from the remote API always do.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a single resource field.
///
/// Strings, numbers, booleans, lists and nested objects, compared structurally.
pub type FieldValue = serde_json::Value;

/// Ordered mapping of field name to value.
pub type Fields = BTreeMap<String, FieldValue>;

/// Kinds of resources the engine can synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Applications (management API clients).
    Application,
    /// Roles.
    Role,
}

impl ResourceKind {
    /// Every supported kind, in reconciliation order.
    pub const ALL: [Self; 2] = [Self::Application, Self::Role];

    /// Collection path of this kind on the management API.
    #[must_use]
    pub const fn collection_path(self) -> &'static str {
        match self {
            Self::Application => "clients",
            Self::Role => "roles",
        }
    }

    /// Attribute carrying the remote identifier.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::Application => "client_id",
            Self::Role => "id",
        }
    }

    /// Section of the tenant file holding desired resources of this kind.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Application => "apps",
            Self::Role => "roles",
        }
    }

    /// Server-managed attributes that are never declared nor sent.
    #[must_use]
    pub const fn read_only_fields(self) -> &'static [&'static str] {
        match self {
            Self::Application => &[
                "tenant",
                "global",
                "signing_keys",
                "client_secret",
                "callback_url_template",
            ],
            Self::Role => &[],
        }
    }

    /// Returns true if `field` is managed by the server for this kind.
    #[must_use]
    pub fn is_read_only(self, field: &str) -> bool {
        field == self.id_field() || self.read_only_fields().contains(&field)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Application => "application",
            Self::Role => "role",
        };
        write!(f, "{s}")
    }
}

/// A synchronizable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Identity key (the resource name).
    pub key: String,
    /// Mutable fields, excluding the identity key.
    #[serde(default)]
    pub fields: Fields,
    /// Remote identifier, assigned by the remote service on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Resource {
    /// Creates a desired resource (no remote identifier).
    #[must_use]
    pub fn desired(kind: ResourceKind, key: impl Into<String>, fields: Fields) -> Self {
        Self {
            kind,
            key: key.into(),
            fields,
            remote_id: None,
        }
    }

    /// Creates an existing resource as reported by the remote service.
    #[must_use]
    pub fn existing(
        kind: ResourceKind,
        key: impl Into<String>,
        remote_id: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            fields,
            remote_id: Some(remote_id.into()),
        }
    }

    /// Sets a field, returning the updated resource.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Gets a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Gets the `description` field if it is a string.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.field("description").and_then(FieldValue::as_str)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.key)?;
        if let Some(id) = &self.remote_id {
            write!(f, " ({id})")?;
        }
        Ok(())
    }
}
