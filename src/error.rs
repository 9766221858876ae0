//! Error types for `tbphase`
//!
//! Phase-graph and traversal failures are programmer or integration errors:
//! they abort the current operation. Task-body failures are not errors in
//! this sense; they are collected per component as [`TaskFailure`] records.

use std::path::PathBuf;
use thiserror::Error;

use crate::phase::PhaseState;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `tbphase` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error (e.g. failure writing command output)
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Phase graph or traversal error
    pub const PHASE_ERROR: i32 = 5;

    /// The run completed but at least one component task failed
    pub const TASK_FAILURE: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `tbphase` operations.
#[derive(Debug, Error)]
pub enum TbPhaseError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase graph, registry or traversal error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// One or more component tasks failed during a run
    #[error("{count} component task(s) failed")]
    TaskFailures {
        /// Number of failed tasks across all phases
        count: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TbPhaseError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Json(_) => ExitCode::ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::TaskFailures { .. } => ExitCode::TASK_FAILURE,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Phase Errors
// ============================================================================

/// Errors raised by the phase graph, the domain registry and the traversal
/// engine.
///
/// None of these are expected at runtime. Each one aborts the phase-graph
/// operation that raised it and leaves the graph unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhaseError {
    /// A phase with the same name is already a member of the graph
    #[error("phase '{phase}' already exists in '{graph}'")]
    DuplicatePhase {
        /// Name of the phase being inserted
        phase: String,
        /// Name of the graph rejecting it
        graph: String,
    },

    /// A placement constraint names a phase that is not in the graph
    #[error("anchor phase '{anchor}' is not a member of '{graph}'")]
    UnknownAnchor {
        /// The missing anchor name
        anchor: String,
        /// Name of the graph that was searched
        graph: String,
    },

    /// A lookup found no matching phase
    #[error("phase not found: {name}{}", did_you_mean(.suggestion.as_deref()))]
    NotFound {
        /// The name or identity that was looked up
        name: String,
        /// Closest name in the searched scope, if any is close enough
        suggestion: Option<String>,
    },

    /// Traversal was asked to enact a state outside the enacted set
    #[error("bad phase state: {0} cannot be enacted on components")]
    BadPhaseState(PhaseState),

    /// An argument was out of range or of the wrong kind
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation needed setup that has not happened yet
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// A function-phase `execute` hook returned an error
    #[error("component '{component}' failed in {phase}: {message}")]
    HookFailed {
        /// Full name of the failing component
        component: String,
        /// Phase being executed
        phase: String,
        /// Error reported by the hook
        message: String,
    },
}

fn did_you_mean(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

/// A single component's task-phase failure.
///
/// Task failures are reported per component on the phase report instead
/// of aborting the traversal.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize)]
#[error("task in '{component}' failed during {phase}: {message}")]
pub struct TaskFailure {
    /// Name of the component whose task failed
    pub component: String,
    /// Phase the task was running
    pub phase: String,
    /// Error message or panic payload
    pub message: String,
    /// Whether the task panicked rather than returning an error
    pub panicked: bool,
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Input exceeded a configured size limit
    #[error("{what} exceeds limit: {actual} > {limit}")]
    LimitExceeded {
        /// What was being counted
        what: String,
        /// Observed size
        actual: usize,
        /// Configured limit
        limit: usize,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "phases.run_phase")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported but does not prevent loading
    Warning,
}

/// Convenience alias for results carrying a [`TbPhaseError`].
pub type Result<T> = std::result::Result<T, TbPhaseError>;
