//! Configuration schema types
//!
//! Types deserialized from engine configuration YAML. Iteration bounds are
//! kept as raw YAML values so that a float or a string is reported as an
//! invalid argument rather than as a parse error.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::engine::EngineOptions;
use crate::error::PhaseError;
use crate::phase::{self, PhaseNode, get_common_domain, registry};

// ============================================================================
// Engine Configuration
// ============================================================================

/// Root of an engine configuration file.
///
/// ```yaml
/// default_max_ready_to_end_iterations: 20
/// task_timeout: 30s
/// phases:
///   run_phase:
///     max_ready_to_end_iterations: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Process-wide ready-to-end bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_ready_to_end_iterations: Option<Value>,

    /// Upper bound on the EXECUTING state of TASK phases (humantime, e.g. `30s`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout: Option<String>,

    /// Per-phase settings keyed by phase name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub phases: BTreeMap<String, PhaseSettings>,
}

/// Settings for a single phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PhaseSettings {
    /// Ready-to-end bound overriding the process default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ready_to_end_iterations: Option<Value>,
}

impl EngineConfig {
    /// Resolves `task_timeout` into a duration.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidArgument`] if the value is not a
    /// humantime duration.
    pub fn task_timeout(&self) -> Result<Option<Duration>, PhaseError> {
        self.task_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw.trim()).map_err(|e| {
                    PhaseError::InvalidArgument(format!("task_timeout '{raw}': {e}"))
                })
            })
            .transpose()
    }

    /// Builds the engine options this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidArgument`] if `task_timeout` is invalid.
    pub fn engine_options(&self) -> Result<EngineOptions, PhaseError> {
        Ok(EngineOptions {
            task_timeout: self.task_timeout()?,
        })
    }

    /// Installs the default bound and the per-phase overrides.
    ///
    /// Every value and phase name is resolved before anything is changed,
    /// so a failing configuration leaves the process untouched. Phase names
    /// are looked up in the common domain first, then in every registered
    /// domain.
    ///
    /// # Errors
    ///
    /// - [`PhaseError::InvalidArgument`] for a bound that is not a
    ///   non-negative integer
    /// - [`PhaseError::NotFound`] for an override naming an unknown phase
    pub fn apply(&self) -> Result<(), PhaseError> {
        let default = self
            .default_max_ready_to_end_iterations
            .as_ref()
            .map(|v| iteration_value("default_max_ready_to_end_iterations", v))
            .transpose()?;

        let common = get_common_domain();
        let mut overrides: Vec<(std::sync::Arc<PhaseNode>, u32)> = Vec::new();
        for (name, settings) in &self.phases {
            let Some(value) = &settings.max_ready_to_end_iterations else {
                continue;
            };
            let field = format!("phases.{name}.max_ready_to_end_iterations");
            let bound = iteration_value(&field, value)?;
            overrides.push((common.find_by_name(name, false)?, bound));
        }

        if let Some(bound) = default {
            phase::set_default_max_ready_to_end_iterations(i64::from(bound))?;
        }
        for (node, bound) in overrides {
            node.set_max_ready_to_end_iterations(i64::from(bound))?;
            tracing::debug!(phase = %node.name(), bound, "ready-to-end override applied");
        }
        Ok(())
    }
}

/// Converts a raw YAML value into a ready-to-end bound.
///
/// # Errors
///
/// Returns [`PhaseError::InvalidArgument`] if `value` is not an integer, is
/// negative, or does not fit in a `u32`.
pub fn iteration_value(field: &str, value: &Value) -> Result<u32, PhaseError> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            registry::iteration_bound(n.as_i64().unwrap_or(i64::MAX), field)
        }
        other => Err(PhaseError::InvalidArgument(format!(
            "{field} must be an integer, got {}",
            describe(other)
        ))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Sequence(_) => "a sequence".to_owned(),
        Value::Mapping(_) => "a mapping".to_owned(),
        Value::Tagged(t) => format!("tagged value {}", t.tag),
    }
}

// ============================================================================
// Topology
// ============================================================================

/// One component of a scripted component tree.
///
/// ```yaml
/// name: env
/// children:
///   - name: agent
///     run_for: 50ms
///     objection: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ComponentSpec {
    /// Instance name
    pub name: String,

    /// Domain the component belongs to; the common domain when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// How long the `run_phase` body runs (humantime)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_for: Option<String>,

    /// Error message returned from `run_phase`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,

    /// Raise an objection against the phase when `run_phase` starts
    #[serde(default)]
    pub objection: bool,

    /// READY_TO_END passes the objection is held through; it is dropped
    /// on the pass after
    #[serde(default = "default_settle_passes")]
    pub settle_passes: u32,

    /// Child components in traversal order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,
}

const fn default_settle_passes() -> u32 {
    1
}

impl ComponentSpec {
    /// Number of components in this subtree, including itself.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    /// Depth of this subtree; a leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> EngineConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn full_config_parses() {
        let config = parse(
            "default_max_ready_to_end_iterations: 7\n\
             task_timeout: 1m 30s\n\
             phases:\n  check_phase:\n    max_ready_to_end_iterations: 2\n",
        );
        assert_eq!(
            config.task_timeout().unwrap(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(config.phases.len(), 1);
        assert!(config.phases.contains_key("check_phase"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_yaml::from_str::<EngineConfig>("max_iterations: 3\n").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
        let err = serde_yaml::from_str::<EngineConfig>("phases:\n  run_phase:\n    bound: 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn iteration_values() {
        assert_eq!(iteration_value("f", &Value::from(0)).unwrap(), 0);
        assert_eq!(iteration_value("f", &Value::from(25)).unwrap(), 25);
        for bad in [
            Value::from(-1),
            Value::from(2.5),
            Value::from("ten"),
            Value::Null,
            Value::from(u64::MAX),
        ] {
            let err = iteration_value("f", &bad).unwrap_err();
            assert!(matches!(err, PhaseError::InvalidArgument(_)), "{bad:?}");
        }
    }

    #[test]
    fn bad_timeout_is_invalid_argument() {
        let config = EngineConfig {
            task_timeout: Some("soon".into()),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.engine_options().unwrap_err(),
            PhaseError::InvalidArgument(_)
        ));
    }

    #[test]
    fn apply_with_unknown_phase_changes_nothing() {
        let config = parse(
            "phases:\n  extract_phase:\n    max_ready_to_end_iterations: 3\n  \
             chek_phase:\n    max_ready_to_end_iterations: 1\n",
        );
        let err = config.apply().unwrap_err();
        assert!(matches!(
            err,
            PhaseError::NotFound { ref suggestion, .. }
                if suggestion.as_deref() == Some("check_phase")
        ));
        let extract = phase::common_phase(phase::CommonPhase::Extract);
        assert_eq!(
            extract.max_ready_to_end_iterations(),
            phase::default_max_ready_to_end_iterations()
        );
    }

    #[test]
    fn topology_counts_and_depth() {
        let spec: ComponentSpec = serde_yaml::from_str(
            "name: env\nchildren:\n  - name: a\n    children:\n      - name: a1\n  - name: b\n",
        )
        .unwrap();
        assert_eq!(spec.count(), 4);
        assert_eq!(spec.depth(), 3);
        assert!(!spec.objection);
        assert_eq!(spec.settle_passes, 1);
    }
}
