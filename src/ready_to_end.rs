//! Ready-to-end iteration control.
//!
//! After the first READY_TO_END pass the objection query is consulted; while
//! objections are pending, READY_TO_END alone is re-enacted, at most
//! `max_ready_to_end_iterations` times. Reaching the bound ends the phase
//! anyway and is not an error.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::component::Component;
use crate::error::PhaseError;
use crate::objection::ObjectionQuery;
use crate::phase::{PhaseNode, PhaseState};
use crate::supervisor::TaskSupervisor;
use crate::traversal::traverse;

/// Outcome of the READY_TO_END stage of one phase execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyToEndOutcome {
    /// Passes after the first one.
    pub iterations: u32,
    /// Whether the bound stopped re-entry while objections were pending.
    pub bound_reached: bool,
}

/// Runs the READY_TO_END stage of `phase` over the tree under `root`.
///
/// # Errors
///
/// Propagates any traversal error; the stage stops at the failing pass.
pub fn run_ready_to_end(
    root: &Arc<dyn Component>,
    phase: &Arc<PhaseNode>,
    tasks: &TaskSupervisor,
    objections: &dyn ObjectionQuery,
) -> Result<ReadyToEndOutcome, PhaseError> {
    traverse(root, phase, PhaseState::ReadyToEnd, tasks)?;

    let max = phase.max_ready_to_end_iterations();
    let mut iterations = 0;
    while objections.objections_pending(phase) {
        if iterations >= max {
            warn!(
                phase = %phase.name(),
                max_iterations = max,
                "ready-to-end bound reached with objections pending; ending phase"
            );
            return Ok(ReadyToEndOutcome {
                iterations,
                bound_reached: true,
            });
        }
        iterations += 1;
        debug!(phase = %phase.name(), iteration = iterations, "re-entering ready-to-end");
        traverse(root, phase, PhaseState::ReadyToEnd, tasks)?;
    }

    Ok(ReadyToEndOutcome {
        iterations,
        bound_reached: false,
    })
}
