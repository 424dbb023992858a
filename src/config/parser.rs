//! Tenant file parser.
//!
//! This module handles loading the tenant file from YAML and applying
//! environment variable overrides, with proper precedence and error handling.

use crate::error::{ConfigError, Result, SyncError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::spec::TenantConfig;

/// Environment variable holding the management API token.
pub const TOKEN_ENV_VAR: &str = "TENANT_SYNC_TOKEN";

/// Parser for loading tenant files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a tenant file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<TenantConfig> {
        let path = path.as_ref();
        info!("Loading tenant file from: {}", path.display());

        if !path.exists() {
            return Err(SyncError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a tenant file from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<TenantConfig> {
        debug!("Parsing YAML tenant file");

        let config: TenantConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!("line {}, column {}", l.line(), l.column()));
            let location = match (source, location) {
                (Some(path), Some(loc)) => Some(format!("{}:{loc}", path.display())),
                (Some(path), None) => Some(path.display().to_string()),
                (None, loc) => loc,
            };
            SyncError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed tenant file for domain: {}", config.tenant.domain);
        Ok(config)
    }

    /// Loads a tenant file with environment variable overrides.
    ///
    /// Recognized variables: `TENANT_SYNC_DOMAIN`, `TENANT_SYNC_CONCURRENCY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override has an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<TenantConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut TenantConfig) -> Result<()> {
        if let Ok(domain) = std::env::var("TENANT_SYNC_DOMAIN") {
            debug!("Overriding tenant.domain from environment");
            config.tenant.domain = domain;
        }

        if let Ok(concurrency) = std::env::var("TENANT_SYNC_CONCURRENCY") {
            debug!("Overriding tenant.concurrency from environment");
            config.tenant.concurrency = concurrency.trim().parse().map_err(|_| {
                SyncError::Config(ConfigError::validation(
                    format!("TENANT_SYNC_CONCURRENCY must be a positive integer, got '{concurrency}'"),
                    "tenant.concurrency",
                ))
            })?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                SyncError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the management API token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set or empty.
    pub fn get_api_token() -> Result<String> {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            Ok(_) => {
                warn!("{TOKEN_ENV_VAR} is set but empty");
                Err(SyncError::Config(ConfigError::MissingEnvVar {
                    name: String::from(TOKEN_ENV_VAR),
                }))
            }
            Err(_) => Err(SyncError::Config(ConfigError::MissingEnvVar {
                name: String::from(TOKEN_ENV_VAR),
            })),
        }
    }
}

/// Default tenant file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "tenant.yaml",
    "tenant.yml",
    "tenant-sync.yaml",
    "tenant-sync.yml",
];

/// Finds the tenant file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no tenant file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found tenant file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(SyncError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
tenant:
  domain: example.eu.auth0.com
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("minimal config should parse");

        assert_eq!(config.tenant.domain, "example.eu.auth0.com");
        assert_eq!(config.tenant.concurrency, 4);
        assert!(!config.tenant.strict);
        assert!((config.guardrails.max_delete_ratio - 0.5).abs() < f64::EPSILON);
        assert!(config.apps.is_none());
        assert!(config.declared_kinds().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
tenant:
  domain: example.eu.auth0.com
  concurrency: 8
  operation_timeout_secs: 20
guardrails:
  max_delete_ratio: 0.25
  allow_empty_desired: true
apps:
  - name: web
    app_type: spa
    callbacks:
      - "https://example.com/callback"
    jwt_configuration:
      alg: RS256
      lifetime_in_seconds: 36000
roles:
  - name: admin
    description: Administrators
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("full config should parse");

        assert_eq!(config.tenant.concurrency, 8);
        assert_eq!(config.tenant.operation_timeout_secs, Some(20));
        assert!(config.guardrails.allow_empty_desired);
        assert_eq!(
            config.declared_kinds(),
            vec![ResourceKind::Application, ResourceKind::Role]
        );

        let apps = config.desired(ResourceKind::Application).expect("apps declared");
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].key, "web");
        assert!(apps[0].field("name").is_none());
        assert_eq!(apps[0].field("app_type"), Some(&json!("spa")));
        assert_eq!(
            apps[0].field("jwt_configuration"),
            Some(&json!({ "alg": "RS256", "lifetime_in_seconds": 36000 }))
        );
    }

    #[test]
    fn test_empty_section_is_declared() {
        let yaml = r"
tenant:
  domain: example.eu.auth0.com
apps: []
";
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("config should parse");

        assert_eq!(config.declared_kinds(), vec![ResourceKind::Application]);
        assert_eq!(config.desired(ResourceKind::Application), Some(vec![]));
        assert_eq!(config.desired(ResourceKind::Role), None);
    }

    #[test]
    fn test_parse_error_reports_location() {
        let yaml = "tenant:\n  domain: [unclosed\n";
        let result = ConfigParser::new().parse_yaml(yaml, Some(Path::new("tenant.yaml")));

        match result {
            Err(SyncError::Config(ConfigError::ParseError { location, .. })) => {
                let location = location.expect("location should be present");
                assert!(location.starts_with("tenant.yaml"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let result = ConfigParser::new().load_file(temp.path().join("missing.yaml"));

        assert!(matches!(
            result,
            Err(SyncError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("Failed to create dirs");
        std::fs::write(temp.path().join("tenant.yml"), "tenant:\n  domain: x\n")
            .expect("Failed to write tenant file");

        let found = find_config_file(&nested).expect("tenant file should be found");
        assert_eq!(found, temp.path().join("tenant.yml"));
    }
}
