//! Tenant file validation.
//!
//! Field-level rules are declared on the tenant file types with the `validator`
//! derive; rules spanning several entries live here. Duplicate names are
//! warnings by default because the matcher reports them as conflicts, and
//! become errors in strict mode.

use crate::error::{ConfigError, Result, SyncError};
use std::collections::HashSet;
use tracing::debug;
use validator::Validate;

use super::spec::{ResourceEntry, TenantConfig};
use crate::resource::ResourceKind;

/// Validator for tenant files.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Reject duplicate names.
    strict: bool,
}

/// Validation result containing all findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
    /// Duplicate names found, per kind.
    pub duplicates: Vec<(ResourceKind, String)>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { strict: false }
    }

    /// Sets strict mode (duplicate names are errors).
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Validates a tenant file.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or a duplicate name error in
    /// strict mode.
    pub fn validate(&self, config: &TenantConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            result.errors.push(ValidationError {
                field: String::from("tenant"),
                message: errors.to_string(),
            });
        }

        if config.declared_kinds().is_empty() {
            result
                .warnings
                .push(String::from("No resource sections declared; nothing will be reconciled"));
        }

        for kind in ResourceKind::ALL {
            if let Some(entries) = config.entries(kind) {
                Self::validate_entries(kind, entries, &mut result);
            }
        }

        if let Some(first_error) = result.errors.first() {
            return Err(SyncError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        if (self.strict || config.tenant.strict)
            && let Some((kind, name)) = result.duplicates.first()
        {
            return Err(SyncError::Config(ConfigError::DuplicateName {
                kind: *kind,
                name: name.clone(),
            }));
        }

        debug!("Tenant file validation passed");
        Ok(result)
    }

    /// Validates the entries of one section.
    fn validate_entries(kind: ResourceKind, entries: &[ResourceEntry], result: &mut ValidationResult) {
        let section = kind.section();

        if entries.is_empty() {
            result.warnings.push(format!(
                "Section '{section}' is empty: every existing {kind} will be deleted"
            ));
            return;
        }

        let mut seen_names = HashSet::new();
        let mut reported = HashSet::new();

        for (i, entry) in entries.iter().enumerate() {
            let prefix = format!("{section}[{i}]");

            if entry.name.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("{kind} name cannot be empty"),
                });
                continue;
            }

            if !seen_names.insert(entry.name.as_str()) && reported.insert(entry.name.as_str()) {
                result.warnings.push(format!(
                    "Duplicate {kind} name '{}': all entries will be reported as conflicts",
                    entry.name
                ));
                result.duplicates.push((kind, entry.name.clone()));
            }

            for field in entry.fields.keys() {
                if kind.is_read_only(field) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.{field}"),
                        message: format!(
                            "Field '{field}' of {kind} '{}' is managed by the server and cannot be declared",
                            entry.name
                        ),
                    });
                }
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if there are no errors.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
