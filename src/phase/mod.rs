//! Phase graph data model
//!
//! Phases are process-wide nodes ordered inside graphs. A domain is a
//! root-level graph; a schedule is a sub-graph that can be spliced into a
//! domain.
//!
//! # Architecture
//!
//! - [`PhaseState`], [`TraversalPolicy`], [`WaitOp`]: lifecycle enums
//! - [`PhaseNode`]: one phase's identity, state, run count and edges
//! - [`PhaseGraph`]: ordered members with validated insertion
//! - [`registry`]: lazily built common domain and user domains

pub mod graph;
pub mod node;
pub mod registry;
pub mod state;

pub use graph::{GraphKind, PhaseGraph, Placement, suggest_phase};
pub use node::PhaseNode;
pub use registry::{
    COMMON_DOMAIN, CommonPhase, DEFAULT_MAX_READY_TO_END_ITERATIONS, common_phase,
    default_max_ready_to_end_iterations, get_common_domain, get_domain, get_domains,
    register_domain, reset_defaults, set_default_max_ready_to_end_iterations,
};
pub use state::{PhaseState, TraversalPolicy, WaitOp};
