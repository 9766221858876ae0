//! CLI argument definitions
//!
//! All Clap derive structs for `tbphase` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::error::ExitCode;

// ============================================================================
// Root CLI
// ============================================================================

/// Hierarchical phase execution engine for testbench component trees.
#[derive(Parser, Debug)]
#[command(name = "tbphase", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "TBPHASE_COLOR")]
    pub color: ColorChoice,

    /// Log line format on stderr.
    #[arg(long, default_value = "human", global = true, env = "TBPHASE_LOG_FORMAT")]
    pub log_format: OutputFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every registered domain and its phases.
    List(ListArgs),

    /// Run the common domain over a scripted component tree.
    Run(RunArgs),

    /// Validate engine configuration files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format.
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the topology YAML describing the component tree.
    #[arg(short, long, env = "TBPHASE_TOPOLOGY")]
    pub topology: PathBuf,

    /// Path to an engine configuration YAML.
    #[arg(short, long, env = "TBPHASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write structured JSONL events to this file.
    #[arg(long, env = "TBPHASE_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "TBPHASE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Output format for the run summary.
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Value Enums
// ============================================================================

/// Color output control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Parse Failures
// ============================================================================

/// Exit code for a failed argument parse.
///
/// `--help` and `--version` surface as parse errors that print to stdout
/// and succeed; everything else is a usage error.
#[must_use]
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        ExitCode::USAGE_ERROR
    } else {
        ExitCode::SUCCESS
    }
}
