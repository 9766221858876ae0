//! Scripted component trees.
//!
//! Builds a component tree from a [`ComponentSpec`] (usually loaded from a
//! topology YAML file). Scripted components log every hook, optionally run
//! a `run_phase` body for a fixed time, optionally fail it, and optionally
//! object to the phase ending. An objection is raised when `run_phase`
//! starts and dropped during READY_TO_END, after `settle_passes` passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::component::{Component, HookError, PhaseSlot};
use crate::config::ComponentSpec;
use crate::error::ConfigError;
use crate::objection::Objections;
use crate::phase::{COMMON_DOMAIN, PhaseNode};

/// A component whose behaviour comes from a topology file.
#[derive(Debug)]
pub struct ScriptedComponent {
    /// Dotted path from the root, e.g. `env.agent`
    name: String,
    domain: String,
    run_for: Option<Duration>,
    fail: Option<String>,
    objection: bool,
    settle_passes: u32,
    /// Remaining READY_TO_END passes per phase this component objects to
    holding: DashMap<String, u32>,
    children: Vec<Arc<dyn Component>>,
    slot: PhaseSlot,
    objections: Arc<Objections>,
}

impl ScriptedComponent {
    fn hold(&self, phase: &PhaseNode) {
        if self
            .holding
            .insert(phase.name().to_owned(), self.settle_passes)
            .is_none()
        {
            self.objections.raise(phase, 1);
            debug!(component = %self.name, phase = %phase.name(), "objection raised");
        }
    }

    fn release(&self, phase: &PhaseNode) {
        if self.holding.remove(phase.name()).is_some() {
            self.objections.drop_objection(phase, 1);
            debug!(component = %self.name, phase = %phase.name(), "objection dropped");
        }
    }
}

#[async_trait]
impl Component for ScriptedComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &[Arc<dyn Component>] {
        &self.children
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn phase_slot(&self) -> &PhaseSlot {
        &self.slot
    }

    fn phase_started(&self, phase: &PhaseNode) {
        debug!(component = %self.name, phase = %phase.name(), "phase started");
    }

    fn execute(&self, phase: &PhaseNode) -> Result<(), HookError> {
        trace!(component = %self.name, phase = %phase.name(), "execute");
        Ok(())
    }

    async fn run_phase(&self, phase: Arc<PhaseNode>) -> Result<(), HookError> {
        if self.objection {
            self.hold(&phase);
        }
        if let Some(run_for) = self.run_for {
            trace!(component = %self.name, phase = %phase.name(), ?run_for, "task running");
            tokio::time::sleep(run_for).await;
        }
        match &self.fail {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    fn phase_ready_to_end(&self, phase: &PhaseNode) {
        trace!(component = %self.name, phase = %phase.name(), "ready to end");
        let settled = match self.holding.get_mut(phase.name()) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if settled {
            self.release(phase);
        }
    }

    fn phase_ended(&self, phase: &PhaseNode) {
        // The ready-to-end bound can end the phase with the objection held
        self.release(phase);
        debug!(component = %self.name, phase = %phase.name(), "phase ended");
    }
}

/// Builds the component tree described by `spec`.
///
/// Components raising objections share `objections`, which the engine
/// should also use as its objection query.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for an empty name or an invalid
/// `run_for` duration anywhere in the tree.
pub fn build_tree(
    spec: &ComponentSpec,
    objections: &Arc<Objections>,
) -> Result<Arc<dyn Component>, ConfigError> {
    build(spec, None, objections)
}

fn build(
    spec: &ComponentSpec,
    parent: Option<&str>,
    objections: &Arc<Objections>,
) -> Result<Arc<dyn Component>, ConfigError> {
    if spec.name.trim().is_empty() || spec.name.contains('.') {
        return Err(ConfigError::InvalidValue {
            field: parent.map_or_else(|| "name".to_owned(), |p| format!("{p}.children.name")),
            value: spec.name.clone(),
            expected: "a non-empty name without '.'".to_owned(),
        });
    }
    let name = parent.map_or_else(|| spec.name.clone(), |p| format!("{p}.{}", spec.name));

    let run_for = spec
        .run_for
        .as_deref()
        .map(|raw| {
            humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                field: format!("{name}.run_for"),
                value: raw.to_owned(),
                expected: format!("a duration such as '50ms' ({e})"),
            })
        })
        .transpose()?;

    let children = spec
        .children
        .iter()
        .map(|child| build(child, Some(&name), objections))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(ScriptedComponent {
        domain: spec.domain.clone().unwrap_or_else(|| COMMON_DOMAIN.to_owned()),
        name,
        run_for,
        fail: spec.fail.clone(),
        objection: spec.objection,
        settle_passes: spec.settle_passes,
        holding: DashMap::new(),
        children,
        slot: PhaseSlot::new(),
        objections: Arc::clone(objections),
    }))
}
