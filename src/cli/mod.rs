//! Command-line interface
//!
//! Argument definitions and the handlers behind each subcommand.

pub mod args;
pub mod commands;
