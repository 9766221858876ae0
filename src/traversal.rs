//! Tree traversal: enacting one phase state across a component tree.
//!
//! The phase's [`TraversalPolicy`] picks the walk:
//!
//! - TOPDOWN: the component, then its children (pre-order)
//! - BOTTOMUP: the children, then the component (post-order)
//! - TASK: same walk as BOTTOMUP, but EXECUTING spawns one concurrent unit
//!   per component through the [`TaskSupervisor`], so no ordering holds
//!   between any two components' task bodies
//!
//! A component is acted on only if the phase's domain is the common domain
//! or equals the component's own domain. Skipping a component never skips
//! its subtree.

use std::sync::Arc;

use tracing::trace;

use crate::component::Component;
use crate::error::PhaseError;
use crate::phase::{COMMON_DOMAIN, PhaseNode, PhaseState, TraversalPolicy};
use crate::supervisor::TaskSupervisor;

/// Enacts `state` of `phase` on every matching component under `root`.
///
/// # Errors
///
/// - [`PhaseError::BadPhaseState`] if `state` is not one of STARTED,
///   EXECUTING, READY_TO_END or ENDED; nothing is touched
/// - [`PhaseError::NotConfigured`] if the phase is not in a domain, or a
///   TASK phase is executed outside a tokio runtime
/// - [`PhaseError::HookFailed`] if a function-phase `execute` hook fails
pub fn traverse(
    root: &Arc<dyn Component>,
    phase: &Arc<PhaseNode>,
    state: PhaseState,
    tasks: &TaskSupervisor,
) -> Result<(), PhaseError> {
    if !state.is_enacted() {
        return Err(PhaseError::BadPhaseState(state));
    }
    let domain = phase.domain()?;
    if phase.policy() == TraversalPolicy::Task
        && state == PhaseState::Executing
        && tokio::runtime::Handle::try_current().is_err()
    {
        return Err(PhaseError::NotConfigured(format!(
            "task phase '{}' needs a tokio runtime",
            phase.name()
        )));
    }

    let walk = Walk {
        phase,
        domain: domain.name(),
        state,
        tasks,
    };
    match phase.policy() {
        TraversalPolicy::TopDown => walk.top_down(root),
        TraversalPolicy::BottomUp | TraversalPolicy::Task => walk.bottom_up(root),
    }
}

struct Walk<'a> {
    phase: &'a Arc<PhaseNode>,
    domain: &'a str,
    state: PhaseState,
    tasks: &'a TaskSupervisor,
}

impl Walk<'_> {
    fn top_down(&self, comp: &Arc<dyn Component>) -> Result<(), PhaseError> {
        self.visit(comp)?;
        for child in comp.children() {
            self.top_down(child)?;
        }
        Ok(())
    }

    fn bottom_up(&self, comp: &Arc<dyn Component>) -> Result<(), PhaseError> {
        for child in comp.children() {
            self.bottom_up(child)?;
        }
        self.visit(comp)
    }

    fn visit(&self, comp: &Arc<dyn Component>) -> Result<(), PhaseError> {
        if !domain_matches(self.domain, comp.domain()) {
            trace!(
                component = %comp.name(),
                component_domain = %comp.domain(),
                phase_domain = %self.domain,
                "domain mismatch, skipping"
            );
            return Ok(());
        }
        apply_state(comp, self.phase, self.state, self.tasks)
    }
}

/// Returns `true` if a phase in `phase_domain` acts on a component in
/// `component_domain`.
#[must_use]
pub fn domain_matches(phase_domain: &str, component_domain: &str) -> bool {
    phase_domain == COMMON_DOMAIN || phase_domain == component_domain
}

/// Applies one state action to a single component.
///
/// | state | action |
/// |---|---|
/// | STARTED | record the phase in the slot, `phase_started`, `start_phase_sequence` |
/// | EXECUTING | spawn `run_phase` (TASK) or call `execute` |
/// | READY_TO_END | `phase_ready_to_end` |
/// | ENDED | `stop_phase_sequence`, `phase_ended`, clear the slot |
///
/// # Errors
///
/// Returns [`PhaseError::BadPhaseState`] for any other state before
/// touching the component, [`PhaseError::HookFailed`] when `execute`
/// fails, and [`PhaseError::NotConfigured`] when a TASK unit cannot be
/// spawned.
pub fn apply_state(
    comp: &Arc<dyn Component>,
    phase: &Arc<PhaseNode>,
    state: PhaseState,
    tasks: &TaskSupervisor,
) -> Result<(), PhaseError> {
    trace!(component = %comp.name(), phase = %phase.name(), %state, "apply");
    match state {
        PhaseState::Started => {
            comp.phase_slot().set(phase);
            comp.phase_started(phase);
            if let Some(sequencer) = comp.sequencer() {
                sequencer.start_phase_sequence(phase);
            }
        }
        PhaseState::Executing => {
            if phase.policy() == TraversalPolicy::Task {
                tasks.spawn(Arc::clone(comp), Arc::clone(phase))?;
            } else {
                comp.execute(phase).map_err(|e| PhaseError::HookFailed {
                    component: comp.name().to_owned(),
                    phase: phase.name().to_owned(),
                    message: e.to_string(),
                })?;
            }
        }
        PhaseState::ReadyToEnd => comp.phase_ready_to_end(phase),
        PhaseState::Ended => {
            if let Some(sequencer) = comp.sequencer() {
                sequencer.stop_phase_sequence(phase);
            }
            comp.phase_ended(phase);
            comp.phase_slot().clear();
        }
        other => return Err(PhaseError::BadPhaseState(other)),
    }
    Ok(())
}
