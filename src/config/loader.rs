//! Desired-state loader.
//!
//! Turns a tenant file into the desired resource set of one kind. The source
//! is either a path, re-read on every load, or an already parsed tenant file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ConfigError, Result, SyncError};
use crate::resource::{Resource, ResourceKind};

use super::parser::ConfigParser;
use super::spec::TenantConfig;
use super::validator::ConfigValidator;

/// Where desired state comes from.
#[derive(Debug, Clone)]
enum ConfigSource {
    /// A tenant file on disk.
    Path(PathBuf),
    /// A parsed and validated tenant file.
    Parsed(Arc<TenantConfig>),
}

/// Loads the desired resource set for a kind.
#[derive(Debug, Clone)]
pub struct DesiredStateLoader {
    /// Source of the tenant file.
    source: ConfigSource,
    /// Reject duplicate names when loading from a path.
    strict: bool,
}

impl DesiredStateLoader {
    /// Creates a loader reading the tenant file at `path`.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ConfigSource::Path(path.into()),
            strict: false,
        }
    }

    /// Creates a loader over an already validated tenant file.
    #[must_use]
    pub fn from_config(config: Arc<TenantConfig>) -> Self {
        Self {
            source: ConfigSource::Parsed(config),
            strict: false,
        }
    }

    /// Sets strict duplicate-name handling for path sources.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Loads the desired set for `kind`.
    ///
    /// Returns `None` when the tenant file does not declare the kind.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing, malformed or
    /// invalid.
    pub async fn load(&self, kind: ResourceKind) -> Result<Option<Vec<Resource>>> {
        let config = match &self.source {
            ConfigSource::Parsed(config) => Arc::clone(config),
            ConfigSource::Path(path) => Arc::new(self.read(path).await?),
        };

        let desired = config.desired(kind);
        match &desired {
            Some(resources) => info!("Loaded {} desired {kind} resources", resources.len()),
            None => debug!("Section '{}' not declared, {kind} resources unmanaged", kind.section()),
        }

        Ok(desired)
    }

    /// Reads, parses and validates the tenant file.
    async fn read(&self, path: &Path) -> Result<TenantConfig> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::Config(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                })
            } else {
                SyncError::Config(ConfigError::ParseError {
                    message: format!("Failed to read file: {e}"),
                    location: Some(path.display().to_string()),
                })
            }
        })?;

        let config = ConfigParser::new().parse_yaml(&content, Some(path))?;
        ConfigValidator::new()
            .with_strict(self.strict)
            .validate(&config)?;

        Ok(config)
    }
}
