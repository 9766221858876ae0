//! Configuration loader
//!
//! Reads engine configuration and topology files:
//! 1. Size check against [`ConfigLimits`]
//! 2. YAML parsing into the typed schema
//! 3. Validation (engine configuration) or limit checks (topology)

use std::path::Path;

use crate::config::schema::{ComponentSpec, EngineConfig};
use crate::config::validation::Validator;
use crate::error::{ConfigError, ValidationIssue};

// ============================================================================
// Public API
// ============================================================================

/// Limits on configuration input to prevent resource exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLimits {
    /// Maximum file size in bytes.
    pub max_config_size: usize,

    /// Maximum number of components in a topology.
    pub max_components: usize,

    /// Maximum nesting depth of a topology.
    pub max_depth: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("TBPHASE_MAX_CONFIG_SIZE", 1024 * 1024),
            max_components: env_or("TBPHASE_MAX_COMPONENTS", 10_000),
            max_depth: env_or("TBPHASE_MAX_DEPTH", 64),
        }
    }
}

/// Result of loading an engine configuration.
#[derive(Debug)]
pub struct LoadResult {
    /// The validated configuration.
    pub config: EngineConfig,

    /// Warnings found during validation.
    pub warnings: Vec<ValidationIssue>,
}

/// Loads engine configuration and topology files.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
}

impl ConfigLoader {
    /// Creates a loader with the given limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Creates a loader with limits taken from the environment.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ConfigLimits::default())
    }

    /// Returns the loader's limits.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Loads and validates an engine configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - YAML parsing fails (including unknown fields)
    /// - Validation finds at least one error
    pub fn load_file(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let content = self.read_bounded(path)?;
        self.load_str(&content, &path.display().to_string())
    }

    /// Parses and validates engine configuration from a string.
    ///
    /// `origin` names the source in error messages. An empty document is
    /// the default configuration.
    ///
    /// # Errors
    ///
    /// See [`load_file`](Self::load_file).
    pub fn load_str(&self, content: &str, origin: &str) -> Result<LoadResult, ConfigError> {
        self.check_size(content.len())?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: origin.into(),
                message: e.to_string(),
            })?
        };

        let result = Validator::new().validate(&config);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.to_owned(),
                errors: result.errors,
            });
        }
        for warning in &result.warnings {
            tracing::warn!(origin, %warning, "configuration warning");
        }

        Ok(LoadResult {
            config,
            warnings: result.warnings,
        })
    }

    /// Loads a topology file describing a component tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// exceeds the component-count or depth limits.
    pub fn load_topology(&self, path: &Path) -> Result<ComponentSpec, ConfigError> {
        let content = self.read_bounded(path)?;
        self.load_topology_str(&content, &path.display().to_string())
    }

    /// Parses a topology from a string.
    ///
    /// # Errors
    ///
    /// See [`load_topology`](Self::load_topology).
    pub fn load_topology_str(
        &self,
        content: &str,
        origin: &str,
    ) -> Result<ComponentSpec, ConfigError> {
        self.check_size(content.len())?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let spec: ComponentSpec =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: origin.into(),
                message: e.to_string(),
            })?;

        let depth = spec.depth();
        if depth > self.limits.max_depth {
            return Err(ConfigError::LimitExceeded {
                what: "topology depth".to_owned(),
                actual: depth,
                limit: self.limits.max_depth,
            });
        }
        let count = spec.count();
        if count > self.limits.max_components {
            return Err(ConfigError::LimitExceeded {
                what: "component count".to_owned(),
                actual: count,
                limit: self.limits.max_components,
            });
        }
        Ok(spec)
    }

    fn read_bounded(&self, path: &Path) -> Result<String, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        self.check_size(file_size)?;

        std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })
    }

    fn check_size(&self, size: usize) -> Result<(), ConfigError> {
        if size > self.limits.max_config_size {
            return Err(ConfigError::LimitExceeded {
                what: "input size".to_owned(),
                actual: size,
                limit: self.limits.max_config_size,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
