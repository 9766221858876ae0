//! Phase lifecycle state, traversal policy and wait comparisons.
//!
//! `PhaseState` is ordered by lifecycle position so that
//! [`WaitOp`] comparisons read naturally ("wait until at least ENDED").

use serde::Serialize;

/// Lifecycle state of one phase node.
///
/// Only the four states for which [`PhaseState::is_enacted`] returns `true`
/// are applied to components by traversal. The others are bookkeeping
/// states the scheduler moves a node through around a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    /// Created but never scheduled.
    Uninitialized,
    /// Idle between runs.
    Dormant,
    /// Selected by the scheduler to run next.
    Scheduled,
    /// Waiting on predecessors.
    Syncing,
    /// `phase_started` hooks are being called.
    Started,
    /// Phase bodies are running.
    Executing,
    /// `phase_ready_to_end` hooks are being called, possibly repeatedly.
    ReadyToEnd,
    /// `phase_ended` hooks are being called.
    Ended,
    /// Outstanding work is being torn down.
    Cleanup,
    /// Side exit from an active state.
    Jumping,
    /// Finished for this run.
    Done,
}

impl PhaseState {
    /// Every state in lifecycle order.
    pub const ALL: [Self; 11] = [
        Self::Uninitialized,
        Self::Dormant,
        Self::Scheduled,
        Self::Syncing,
        Self::Started,
        Self::Executing,
        Self::ReadyToEnd,
        Self::Ended,
        Self::Cleanup,
        Self::Jumping,
        Self::Done,
    ];

    /// Returns `true` for the states traversal applies to components:
    /// STARTED, EXECUTING, READY_TO_END and ENDED.
    #[must_use]
    pub const fn is_enacted(self) -> bool {
        matches!(
            self,
            Self::Started | Self::Executing | Self::ReadyToEnd | Self::Ended
        )
    }

    /// Upper-case lifecycle name, e.g. `"READY_TO_END"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Dormant => "DORMANT",
            Self::Scheduled => "SCHEDULED",
            Self::Syncing => "SYNCING",
            Self::Started => "STARTED",
            Self::Executing => "EXECUTING",
            Self::ReadyToEnd => "READY_TO_END",
            Self::Ended => "ENDED",
            Self::Cleanup => "CLEANUP",
            Self::Jumping => "JUMPING",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// How a phase walks the component tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraversalPolicy {
    /// Parent before children, synchronously.
    TopDown,
    /// Children before parent, synchronously.
    BottomUp,
    /// One concurrent unit per component while executing; no ordering.
    Task,
}

impl TraversalPolicy {
    /// Upper-case policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopDown => "TOPDOWN",
            Self::BottomUp => "BOTTOMUP",
            Self::Task => "TASK",
        }
    }
}

impl std::fmt::Display for TraversalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Comparison used by [`PhaseNode::wait_for_state`](super::PhaseNode::wait_for_state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOp {
    /// Current state equals the target.
    Eq,
    /// Current state differs from the target.
    Ne,
    /// Current state is before the target.
    Lt,
    /// Current state is at or before the target.
    Lte,
    /// Current state is after the target.
    Gt,
    /// Current state is at or after the target.
    Gte,
}

impl WaitOp {
    /// Returns whether `current <op> target` holds.
    #[must_use]
    pub fn matches(self, current: PhaseState, target: PhaseState) -> bool {
        match self {
            Self::Eq => current == target,
            Self::Ne => current != target,
            Self::Lt => current < target,
            Self::Lte => current <= target,
            Self::Gt => current > target,
            Self::Gte => current >= target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_order_matches_declaration() {
        for pair in PhaseState::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn only_four_states_are_enacted() {
        let enacted: Vec<_> = PhaseState::ALL
            .into_iter()
            .filter(|s| s.is_enacted())
            .collect();
        assert_eq!(
            enacted,
            vec![
                PhaseState::Started,
                PhaseState::Executing,
                PhaseState::ReadyToEnd,
                PhaseState::Ended
            ]
        );
    }

    #[test]
    fn wait_op_comparisons() {
        use PhaseState::{Ended, Executing, Started};
        assert!(WaitOp::Eq.matches(Started, Started));
        assert!(WaitOp::Ne.matches(Started, Ended));
        assert!(WaitOp::Lt.matches(Started, Ended));
        assert!(!WaitOp::Lt.matches(Ended, Ended));
        assert!(WaitOp::Lte.matches(Ended, Ended));
        assert!(WaitOp::Gt.matches(Ended, Executing));
        assert!(WaitOp::Gte.matches(Executing, Executing));
        assert!(!WaitOp::Gte.matches(Started, Executing));
    }

    #[test]
    fn state_serializes_screaming_snake() {
        let json = serde_json::to_string(&PhaseState::ReadyToEnd).unwrap();
        assert_eq!(json, "\"READY_TO_END\"");
        assert_eq!(PhaseState::ReadyToEnd.to_string(), "READY_TO_END");
    }

    #[test]
    fn policy_display() {
        assert_eq!(TraversalPolicy::TopDown.to_string(), "TOPDOWN");
        assert_eq!(TraversalPolicy::BottomUp.to_string(), "BOTTOMUP");
        assert_eq!(TraversalPolicy::Task.to_string(), "TASK");
        let json = serde_json::to_string(&TraversalPolicy::BottomUp).unwrap();
        assert_eq!(json, "\"BOTTOMUP\"");
    }
}
