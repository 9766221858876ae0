//! `validate` command
//!
//! Loads each configuration file through the full loading pipeline and
//! reports errors and warnings without running anything.

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::ConfigLoader;
use crate::error::{ConfigError, TbPhaseError};

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validate configuration files.
///
/// Every file is checked; the first failure is returned after all of them
/// have been reported.
///
/// # Errors
///
/// Returns the first file's configuration error, if any file is invalid.
pub fn run(args: &ValidateArgs) -> Result<(), TbPhaseError> {
    let loader = ConfigLoader::with_defaults();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let report = match loader.load_file(path) {
            Ok(result) => FileReport {
                file: path.display().to_string(),
                valid: true,
                errors: Vec::new(),
                warnings: result.warnings.iter().map(ToString::to_string).collect(),
            },
            Err(e) => {
                let errors = match &e {
                    ConfigError::ValidationError { errors, .. } => {
                        errors.iter().map(ToString::to_string).collect()
                    }
                    other => vec![other.to_string()],
                };
                first_error.get_or_insert(e);
                FileReport {
                    file: path.display().to_string(),
                    valid: false,
                    errors,
                    warnings: Vec::new(),
                }
            }
        };
        reports.push(report);
    }

    match args.format {
        OutputFormat::Human => {
            for report in &reports {
                let mark = if report.valid { "ok" } else { "FAILED" };
                println!("{}: {mark}", report.file);
                for line in report.errors.iter().chain(&report.warnings) {
                    println!("  {line}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}
