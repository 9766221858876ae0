//! Configuration validation
//!
//! Semantic checks on a parsed [`EngineConfig`]. Validation collects ALL
//! issues instead of stopping at the first one, so a user sees every
//! problem in a single pass.

use std::time::Duration;

use crate::config::schema::{EngineConfig, iteration_value};
use crate::error::{Severity, ValidationIssue};
use crate::phase::{get_domains, suggest_phase};

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Engine configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &EngineConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        if let Some(value) = &config.default_max_ready_to_end_iterations {
            if let Err(e) = iteration_value("default_max_ready_to_end_iterations", value) {
                self.add_error("default_max_ready_to_end_iterations", &e.to_string());
            }
        }
        self.validate_task_timeout(config);
        self.validate_phases(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_task_timeout(&mut self, config: &EngineConfig) {
        match config.task_timeout() {
            Ok(Some(Duration::ZERO)) => {
                self.add_error("task_timeout", "task_timeout must be greater than zero");
            }
            Ok(_) => {}
            Err(e) => self.add_error("task_timeout", &e.to_string()),
        }
    }

    fn validate_phases(&mut self, config: &EngineConfig) {
        let known: Vec<String> = get_domains()
            .values()
            .flat_map(|domain| domain.phase_names())
            .collect();

        for (name, settings) in &config.phases {
            let path = format!("phases.{name}");
            if name.trim().is_empty() {
                self.add_error(&path, "phase name cannot be empty");
                continue;
            }

            if !known.iter().any(|k| k == name) {
                let message = suggest_phase(name, known.iter().map(String::as_str)).map_or_else(
                    || format!("'{name}' is not a registered phase"),
                    |s| format!("'{name}' is not a registered phase (did you mean '{s}'?)"),
                );
                self.add_warning(&path, &message);
            }

            match &settings.max_ready_to_end_iterations {
                Some(value) => {
                    let field = format!("{path}.max_ready_to_end_iterations");
                    if let Err(e) = iteration_value(&field, value) {
                        self.add_error(&field, &e.to_string());
                    }
                }
                None => self.add_warning(&path, "phase entry has no settings"),
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
