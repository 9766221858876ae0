//! Logging initialization.
//!
//! Structured logging via `tracing` with human-readable and JSON output,
//! configurable verbosity, and environment-based override via
//! `TBPHASE_LOG_LEVEL`.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable overriding the verbosity flags.
pub const LOG_LEVEL_ENV: &str = "TBPHASE_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

/// Builds the default filter directives for a verbosity level.
///
/// Verbosity raises this crate's level first; dependencies stay at `warn`
/// until `-vvvv`.
#[must_use]
pub fn default_directives(verbosity: u8) -> String {
    let crate_level = match verbosity {
        0 => return "warn".to_owned(),
        1 => "info",
        2 => "debug",
        3 => "trace",
        _ => return "trace".to_owned(),
    };
    format!("warn,{}={crate_level}", env!("CARGO_CRATE_NAME"))
}

/// Resolves whether stderr log lines get ANSI colors.
#[must_use]
pub fn use_ansi(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

/// Initializes the global tracing subscriber, writing to stderr.
///
/// If `TBPHASE_LOG_LEVEL` is set it replaces the directives derived from
/// `verbosity`. JSON lines carry the event fields at the top level, next to
/// the phase and component fields the engine logs. Uses `try_init()` so
/// calling this more than once is harmless.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let show_target = verbosity >= 2;

    let _ = match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi(color))
            .with_target(show_target)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_target(show_target)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default_is_human() {
        assert_eq!(LogFormat::default(), LogFormat::Human);
    }

    #[test]
    fn init_logging_is_repeatable() {
        init_logging(LogFormat::Human, 0, ColorChoice::Auto);
        init_logging(LogFormat::Json, 3, ColorChoice::Never);
    }

    #[test]
    fn verbosity_is_scoped_to_this_crate() {
        assert_eq!(default_directives(0), "warn");
        assert_eq!(default_directives(1), "warn,tbphase=info");
        assert_eq!(default_directives(2), "warn,tbphase=debug");
        assert_eq!(default_directives(3), "warn,tbphase=trace");
        assert_eq!(default_directives(4), "trace");
        assert_eq!(default_directives(u8::MAX), "trace");
    }

    #[test]
    fn directives_parse_as_filters() {
        for verbosity in 0..=4 {
            assert!(EnvFilter::try_new(default_directives(verbosity)).is_ok());
        }
    }

    #[test]
    fn explicit_color_choices() {
        assert!(use_ansi(ColorChoice::Always));
        assert!(!use_ansi(ColorChoice::Never));
    }
}
