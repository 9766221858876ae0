//! Configuration module
//!
//! Loads and validates engine configuration (ready-to-end bounds, task
//! timeout) and the topology files that describe scripted component trees.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult};
pub use schema::{ComponentSpec, EngineConfig, PhaseSettings, iteration_value};
pub use validation::{ValidationResult, Validator};
