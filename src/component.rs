//! Component interface consumed by traversal.
//!
//! The engine does not own the component tree. It only needs each
//! component's children, its domain, a slot holding the current phase and
//! the capability hooks below. Every hook has a no-op default.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::phase::{COMMON_DOMAIN, PhaseNode};
use crate::sync::lock;

/// Error type returned by component hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A node in the component tree.
#[async_trait]
pub trait Component: Send + Sync {
    /// Instance name, used in logs and failure reports.
    fn name(&self) -> &str;

    /// Children in traversal order.
    fn children(&self) -> &[Arc<dyn Component>];

    /// Domain the component belongs to.
    fn domain(&self) -> &str {
        COMMON_DOMAIN
    }

    /// Slot recording the phase the component is currently in.
    fn phase_slot(&self) -> &PhaseSlot;

    /// Called when a phase enters STARTED.
    fn phase_started(&self, _phase: &PhaseNode) {}

    /// Function-style body of TOPDOWN and BOTTOMUP phases.
    ///
    /// # Errors
    ///
    /// An error aborts the run.
    fn execute(&self, _phase: &PhaseNode) -> Result<(), HookError> {
        Ok(())
    }

    /// Task-style body of TASK phases, run concurrently with every other
    /// component.
    ///
    /// # Errors
    ///
    /// An error (or panic) is reported as a task failure for this component.
    async fn run_phase(&self, _phase: Arc<PhaseNode>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on every READY_TO_END pass.
    fn phase_ready_to_end(&self, _phase: &PhaseNode) {}

    /// Called when a phase enters ENDED.
    fn phase_ended(&self, _phase: &PhaseNode) {}

    /// Optional per-phase sequence control.
    fn sequencer(&self) -> Option<&dyn PhaseSequencer> {
        None
    }
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name())
            .field("domain", &self.domain())
            .finish_non_exhaustive()
    }
}

/// Starts and stops a component's default sequence around a phase.
pub trait PhaseSequencer: Send + Sync {
    /// Called after `phase_started`.
    fn start_phase_sequence(&self, phase: &PhaseNode);

    /// Called before `phase_ended`.
    fn stop_phase_sequence(&self, phase: &PhaseNode);
}

/// Interior-mutable "current phase" record carried by every component.
#[derive(Debug, Default)]
pub struct PhaseSlot {
    current: Mutex<Option<Arc<PhaseNode>>>,
}

impl PhaseSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the phase currently recorded, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<PhaseNode>> {
        lock(&self.current).clone()
    }

    pub(crate) fn set(&self, phase: &Arc<PhaseNode>) {
        *lock(&self.current) = Some(Arc::clone(phase));
    }

    pub(crate) fn clear(&self) {
        *lock(&self.current) = None;
    }
}
