//! Tenant file specification types.
//!
//! This module defines the structs that map to the tenant file. The file is
//! authoritative for every section it declares: a declared section lists the
//! complete desired set for its resource kind.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::resource::{Fields, Resource, ResourceKind};

/// The root structure of a tenant file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct TenantConfig {
    /// Tenant connection and execution settings.
    #[validate(nested)]
    pub tenant: TenantSettings,
    /// Safety guardrails applied before execution.
    #[serde(default)]
    #[validate(nested)]
    pub guardrails: GuardrailsConfig,
    /// Desired applications. `None` leaves applications unmanaged.
    #[serde(default)]
    pub apps: Option<Vec<ResourceEntry>>,
    /// Desired roles. `None` leaves roles unmanaged.
    #[serde(default)]
    pub roles: Option<Vec<ResourceEntry>>,
}

/// Tenant-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct TenantSettings {
    /// Tenant domain hosting the management API.
    #[validate(length(min = 1, message = "tenant domain cannot be empty"))]
    pub domain: String,
    /// Maximum operations in flight per operation class.
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 64, message = "concurrency must be between 1 and 64"))]
    pub concurrency: usize,
    /// Optional per-operation timeout enforced by the executor.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    /// Reject duplicate names instead of reporting them as conflicts.
    #[serde(default)]
    pub strict: bool,
}

/// Guardrails for destructive plans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct GuardrailsConfig {
    /// Share of existing resources a plan may delete without confirmation.
    #[serde(default = "default_max_delete_ratio")]
    #[validate(range(min = 0.0, max = 1.0, message = "max_delete_ratio must be between 0 and 1"))]
    pub max_delete_ratio: f64,
    /// Allow an empty desired section to wipe every existing resource
    /// without confirmation.
    #[serde(default)]
    pub allow_empty_desired: bool,
}

/// A single desired resource entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Identity key.
    pub name: String,
    /// Every other declared attribute.
    #[serde(flatten)]
    pub fields: Fields,
}

impl TenantConfig {
    /// Returns the declared entries for a kind, if its section is present.
    #[must_use]
    pub fn entries(&self, kind: ResourceKind) -> Option<&[ResourceEntry]> {
        match kind {
            ResourceKind::Application => self.apps.as_deref(),
            ResourceKind::Role => self.roles.as_deref(),
        }
    }

    /// Returns the kinds whose section is declared.
    #[must_use]
    pub fn declared_kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.entries(*kind).is_some())
            .collect()
    }

    /// Converts the declared entries of a kind into desired resources.
    #[must_use]
    pub fn desired(&self, kind: ResourceKind) -> Option<Vec<Resource>> {
        self.entries(kind).map(|entries| {
            entries
                .iter()
                .map(|entry| Resource::desired(kind, entry.name.clone(), entry.fields.clone()))
                .collect()
        })
    }

    /// Returns the total number of declared resources.
    #[must_use]
    pub fn total_resources(&self) -> usize {
        ResourceKind::ALL
            .into_iter()
            .filter_map(|kind| self.entries(kind))
            .map(<[ResourceEntry]>::len)
            .sum()
    }
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_delete_ratio: default_max_delete_ratio(),
            allow_empty_desired: false,
        }
    }
}

const fn default_concurrency() -> usize {
    4
}

const fn default_max_delete_ratio() -> f64 {
    0.5
}
