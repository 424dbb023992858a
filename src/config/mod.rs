//! Configuration module.
//!
//! This module handles everything about the tenant file:
//! - Parsing and deserializing the YAML tenant file
//! - Validation of settings and declared resources
//! - Loading the desired resource set per kind
//! - Hashing desired state for reporting

mod spec;
mod parser;
mod validator;
mod loader;
mod hash;

pub use spec::{GuardrailsConfig, ResourceEntry, TenantConfig, TenantSettings};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, TOKEN_ENV_VAR, find_config_file};
pub use validator::{ConfigValidator, ValidationResult};
pub use loader::DesiredStateLoader;
pub use hash::ConfigHasher;
