//! Phase nodes.
//!
//! A node is the identity and run-state of one phase. Nodes are shared as
//! `Arc<PhaseNode>` for the lifetime of the process; all mutable state sits
//! behind atomics, a `watch` channel or short-lived locks, so a node can be
//! read from component tasks while the engine advances it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::sync::watch;

use crate::error::PhaseError;
use crate::sync::lock;

use super::graph::PhaseGraph;
use super::registry;
use super::state::{PhaseState, TraversalPolicy, WaitOp};

/// One phase: a name, a traversal policy and its lifecycle state.
pub struct PhaseNode {
    name: String,
    policy: TraversalPolicy,
    /// Current lifecycle state; receivers back `wait_for_state`
    state: watch::Sender<PhaseState>,
    /// Completed executions
    run_count: AtomicU64,
    /// Per-phase ready-to-end bound; `None` follows the process default
    max_ready_to_end: Mutex<Option<u32>>,
    /// Graph this node was first added to
    parent: OnceLock<Weak<PhaseGraph>>,
    predecessors: Mutex<Vec<Weak<Self>>>,
    successors: Mutex<Vec<Weak<Self>>>,
}

impl PhaseNode {
    /// Creates a detached node in the UNINITIALIZED state.
    #[must_use]
    pub fn new(name: impl Into<String>, policy: TraversalPolicy) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            policy,
            state: watch::Sender::new(PhaseState::Uninitialized),
            run_count: AtomicU64::new(0),
            max_ready_to_end: Mutex::new(None),
            parent: OnceLock::new(),
            predecessors: Mutex::new(Vec::new()),
            successors: Mutex::new(Vec::new()),
        })
    }

    /// Returns the phase name, unique within its graph.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the traversal policy (the phase's "type").
    #[must_use]
    pub const fn policy(&self) -> TraversalPolicy {
        self.policy
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PhaseState {
        *self.state.borrow()
    }

    /// Moves the node to `next` and returns the previous state.
    pub(crate) fn set_state(&self, next: PhaseState) -> PhaseState {
        self.state.send_replace(next)
    }

    /// Returns how many times the phase has run to DONE.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_run_count(&self) -> u64 {
        self.run_count.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Overrides the ready-to-end iteration bound for this phase.
    ///
    /// `0` means READY_TO_END is never repeated.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidArgument`] when `max` is negative or
    /// does not fit in a `u32`.
    pub fn set_max_ready_to_end_iterations(&self, max: i64) -> Result<(), PhaseError> {
        let bound = registry::iteration_bound(max, "max_ready_to_end_iterations")?;
        *lock(&self.max_ready_to_end) = Some(bound);
        Ok(())
    }

    /// Drops the per-phase override so the process default applies again.
    pub fn clear_max_ready_to_end_iterations(&self) {
        *lock(&self.max_ready_to_end) = None;
    }

    /// Returns the effective ready-to-end bound: the override if set,
    /// otherwise the process-wide default.
    #[must_use]
    pub fn max_ready_to_end_iterations(&self) -> u32 {
        let bound = *lock(&self.max_ready_to_end);
        bound.unwrap_or_else(registry::default_max_ready_to_end_iterations)
    }

    /// Returns the graph this node belongs to, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<PhaseGraph>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Returns the domain owning this node.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotConfigured`] if the node was never added to
    /// a graph, or its schedule was never added to a domain.
    pub fn domain(&self) -> Result<Arc<PhaseGraph>, PhaseError> {
        self.parent()
            .ok_or_else(|| {
                PhaseError::NotConfigured(format!("phase '{}' is not in any graph", self.name))
            })?
            .domain()
    }

    /// Finds a phase by name relative to this node.
    ///
    /// With `stay_in_scope` the search covers this node's graph and its
    /// domain; otherwise every registered domain is searched as well.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotFound`] when no phase matches.
    pub fn find_by_name(&self, name: &str, stay_in_scope: bool) -> Result<Arc<Self>, PhaseError> {
        match self.parent() {
            Some(graph) => graph.find_by_name(name, stay_in_scope),
            None if !stay_in_scope => registry::find_by_name(name),
            None => Err(PhaseError::NotFound {
                name: name.to_owned(),
                suggestion: None,
            }),
        }
    }

    /// Finds the node identical to `phase` relative to this node.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotFound`] when `phase` is not in scope.
    pub fn find(&self, phase: &Self, stay_in_scope: bool) -> Result<Arc<Self>, PhaseError> {
        match self.parent() {
            Some(graph) => graph.find(phase, stay_in_scope),
            None if !stay_in_scope => registry::find(phase),
            None => Err(PhaseError::NotFound {
                name: phase.name.clone(),
                suggestion: None,
            }),
        }
    }

    /// Waits until `state() <op> target` holds and returns the state seen.
    pub async fn wait_for_state(&self, target: PhaseState, op: WaitOp) -> PhaseState {
        let mut rx = self.state.subscribe();
        rx.wait_for(|current| op.matches(*current, target))
            .await
            .map_or_else(|_| self.state(), |seen| *seen)
    }

    /// Phases that must finish before this one.
    #[must_use]
    pub fn predecessors(&self) -> Vec<Arc<Self>> {
        lock(&self.predecessors)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Phases that follow this one.
    #[must_use]
    pub fn successors(&self) -> Vec<Arc<Self>> {
        lock(&self.successors)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Claims `graph` as this node's parent. Returns `false` if the node
    /// already had one.
    pub(crate) fn attach(&self, graph: &Arc<PhaseGraph>) -> bool {
        if self.parent.set(Arc::downgrade(graph)).is_err() {
            return false;
        }
        self.state.send_replace(PhaseState::Dormant);
        true
    }

    pub(crate) fn link(from: &Arc<Self>, to: &Arc<Self>) {
        lock(&from.successors).push(Arc::downgrade(to));
        lock(&to.predecessors).push(Arc::downgrade(from));
    }

    pub(crate) fn unlink(from: &Arc<Self>, to: &Arc<Self>) {
        lock(&from.successors).retain(|w| !points_to(w, to));
        lock(&to.predecessors).retain(|w| !points_to(w, from));
    }
}

fn points_to(weak: &Weak<PhaseNode>, node: &Arc<PhaseNode>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(node))
}

impl std::fmt::Debug for PhaseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseNode")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn new_node_is_uninitialized_and_detached() {
        let node = PhaseNode::new("main_phase", TraversalPolicy::Task);
        assert_eq!(node.name(), "main_phase");
        assert_eq!(node.policy(), TraversalPolicy::Task);
        assert_eq!(node.state(), PhaseState::Uninitialized);
        assert_eq!(node.run_count(), 0);
        assert!(node.parent().is_none());
    }

    #[test]
    fn domain_of_detached_node_is_not_configured() {
        let node = PhaseNode::new("orphan", TraversalPolicy::BottomUp);
        assert!(matches!(node.domain(), Err(PhaseError::NotConfigured(_))));
    }

    #[test]
    fn negative_override_is_rejected_and_leaves_value() {
        let node = PhaseNode::new("p", TraversalPolicy::BottomUp);
        node.set_max_ready_to_end_iterations(3).unwrap();
        let err = node.set_max_ready_to_end_iterations(-1).unwrap_err();
        assert!(matches!(err, PhaseError::InvalidArgument(_)));
        assert_eq!(node.max_ready_to_end_iterations(), 3);
    }

    #[test]
    fn oversized_override_is_rejected() {
        let node = PhaseNode::new("p", TraversalPolicy::BottomUp);
        let err = node
            .set_max_ready_to_end_iterations(i64::from(u32::MAX) + 1)
            .unwrap_err();
        assert!(matches!(err, PhaseError::InvalidArgument(_)));
    }

    #[test]
    fn zero_override_is_allowed() {
        let node = PhaseNode::new("p", TraversalPolicy::BottomUp);
        node.set_max_ready_to_end_iterations(0).unwrap();
        assert_eq!(node.max_ready_to_end_iterations(), 0);
        node.clear_max_ready_to_end_iterations();
        assert_eq!(
            node.max_ready_to_end_iterations(),
            registry::default_max_ready_to_end_iterations()
        );
    }

    #[test]
    fn run_count_increments() {
        let node = PhaseNode::new("p", TraversalPolicy::TopDown);
        assert_eq!(node.increment_run_count(), 1);
        assert_eq!(node.increment_run_count(), 2);
        assert_eq!(node.run_count(), 2);
    }

    #[test]
    fn link_and_unlink_edges() {
        let a = PhaseNode::new("a", TraversalPolicy::TopDown);
        let b = PhaseNode::new("b", TraversalPolicy::TopDown);
        PhaseNode::link(&a, &b);
        assert_eq!(a.successors()[0].name(), "b");
        assert_eq!(b.predecessors()[0].name(), "a");

        PhaseNode::unlink(&a, &b);
        assert!(a.successors().is_empty());
        assert!(b.predecessors().is_empty());
    }

    #[tokio::test]
    async fn wait_for_state_returns_immediately_when_satisfied() {
        let node = PhaseNode::new("p", TraversalPolicy::Task);
        let seen = node
            .wait_for_state(PhaseState::Uninitialized, WaitOp::Eq)
            .await;
        assert_eq!(seen, PhaseState::Uninitialized);
    }

    #[test]
    fn wait_for_state_stays_pending_until_matched() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let node = PhaseNode::new("p", TraversalPolicy::Task);
        let mut wait = task::spawn(node.wait_for_state(PhaseState::Syncing, WaitOp::Gte));
        assert_pending!(wait.poll());

        node.set_state(PhaseState::Syncing);
        assert!(wait.is_woken());
        assert_ready_eq!(wait.poll(), PhaseState::Syncing);
    }

    #[tokio::test]
    async fn wait_for_state_wakes_on_transition() {
        let node = PhaseNode::new("p", TraversalPolicy::Task);
        let waiter = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.wait_for_state(PhaseState::Ended, WaitOp::Gte).await })
        };

        node.set_state(PhaseState::Started);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        node.set_state(PhaseState::Done);
        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(seen >= PhaseState::Ended);
    }
}
