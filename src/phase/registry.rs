//! Process-wide domain registry.
//!
//! The registry maps domain names to domains. The "common" domain with the
//! nine standard phases is built on first access, exactly once, and every
//! later call sees the same instance. The ready-to-end iteration default
//! lives here too, with [`reset_defaults`] as its teardown.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::PhaseError;

use super::graph::{self, GraphKind, PhaseGraph};
use super::node::PhaseNode;
use super::state::TraversalPolicy;

/// Name of the domain every component matches.
pub const COMMON_DOMAIN: &str = "common";

/// Ready-to-end bound used when neither the process nor the phase sets one.
pub const DEFAULT_MAX_READY_TO_END_ITERATIONS: u32 = 20;

static DEFAULT_MAX_READY_TO_END: AtomicU32 = AtomicU32::new(DEFAULT_MAX_READY_TO_END_ITERATIONS);

static DOMAINS: OnceLock<DashMap<String, Arc<PhaseGraph>>> = OnceLock::new();

static COMMON: OnceLock<CommonDomain> = OnceLock::new();

struct CommonDomain {
    domain: Arc<PhaseGraph>,
    phases: [Arc<PhaseNode>; 9],
}

/// The nine standard phases of the common domain, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommonPhase {
    /// `build_phase`, top-down.
    Build,
    /// `connect_phase`, bottom-up.
    Connect,
    /// `end_of_elaboration_phase`, bottom-up.
    EndOfElaboration,
    /// `start_of_simulation_phase`, bottom-up.
    StartOfSimulation,
    /// `run_phase`, task.
    Run,
    /// `extract_phase`, bottom-up.
    Extract,
    /// `check_phase`, bottom-up.
    Check,
    /// `report_phase`, bottom-up.
    Report,
    /// `final_phase`, top-down.
    Final,
}

impl CommonPhase {
    /// All common phases in canonical order.
    pub const ALL: [Self; 9] = [
        Self::Build,
        Self::Connect,
        Self::EndOfElaboration,
        Self::StartOfSimulation,
        Self::Run,
        Self::Extract,
        Self::Check,
        Self::Report,
        Self::Final,
    ];

    /// Canonical phase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Build => "build_phase",
            Self::Connect => "connect_phase",
            Self::EndOfElaboration => "end_of_elaboration_phase",
            Self::StartOfSimulation => "start_of_simulation_phase",
            Self::Run => "run_phase",
            Self::Extract => "extract_phase",
            Self::Check => "check_phase",
            Self::Report => "report_phase",
            Self::Final => "final_phase",
        }
    }

    /// Traversal policy of the phase.
    #[must_use]
    pub const fn policy(self) -> TraversalPolicy {
        match self {
            Self::Build | Self::Final => TraversalPolicy::TopDown,
            Self::Run => TraversalPolicy::Task,
            Self::Connect
            | Self::EndOfElaboration
            | Self::StartOfSimulation
            | Self::Extract
            | Self::Check
            | Self::Report => TraversalPolicy::BottomUp,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

fn domains() -> &'static DashMap<String, Arc<PhaseGraph>> {
    DOMAINS.get_or_init(DashMap::new)
}

fn common() -> &'static CommonDomain {
    COMMON.get_or_init(|| {
        let domain = PhaseGraph::new_domain(COMMON_DOMAIN);
        let phases = CommonPhase::ALL.map(|p| PhaseNode::new(p.name(), p.policy()));
        domain.append_all(&phases);
        domains().insert(COMMON_DOMAIN.to_owned(), Arc::clone(&domain));
        debug!(phases = phases.len(), "common domain initialized");
        CommonDomain { domain, phases }
    })
}

/// Returns the common domain, building it on first call.
#[must_use]
pub fn get_common_domain() -> Arc<PhaseGraph> {
    Arc::clone(&common().domain)
}

/// Returns the singleton node of a standard phase.
#[must_use]
pub fn common_phase(phase: CommonPhase) -> Arc<PhaseNode> {
    Arc::clone(&common().phases[phase.index()])
}

/// Read-only snapshot of every registered domain, keyed by name.
#[must_use]
pub fn get_domains() -> BTreeMap<String, Arc<PhaseGraph>> {
    common();
    domains()
        .iter()
        .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
        .collect()
}

/// Looks up a registered domain by name.
#[must_use]
pub fn get_domain(name: &str) -> Option<Arc<PhaseGraph>> {
    common();
    domains().get(name).map(|d| Arc::clone(d.value()))
}

/// Registers a user domain.
///
/// # Errors
///
/// Returns [`PhaseError::InvalidArgument`] if `domain` is a schedule or a
/// domain with the same name is already registered.
pub fn register_domain(domain: &Arc<PhaseGraph>) -> Result<(), PhaseError> {
    if domain.kind() != GraphKind::Domain {
        return Err(PhaseError::InvalidArgument(format!(
            "'{}' is a schedule, not a domain",
            domain.name()
        )));
    }
    common();
    match domains().entry(domain.name().to_owned()) {
        Entry::Occupied(_) => Err(PhaseError::InvalidArgument(format!(
            "domain '{}' is already registered",
            domain.name()
        ))),
        Entry::Vacant(slot) => {
            slot.insert(Arc::clone(domain));
            debug!(domain = %domain.name(), "domain registered");
            Ok(())
        }
    }
}

/// Searches every registered domain for a phase name.
pub(crate) fn find_by_name(name: &str) -> Result<Arc<PhaseNode>, PhaseError> {
    let scopes: Vec<_> = get_domains().into_values().collect();
    graph::find_by_name_in(&scopes, name)
}

/// Searches every registered domain for `phase` by identity.
pub(crate) fn find(phase: &PhaseNode) -> Result<Arc<PhaseNode>, PhaseError> {
    let scopes: Vec<_> = get_domains().into_values().collect();
    graph::find_in(&scopes, phase)
}

/// Returns the process-wide ready-to-end iteration default.
#[must_use]
pub fn default_max_ready_to_end_iterations() -> u32 {
    DEFAULT_MAX_READY_TO_END.load(Ordering::SeqCst)
}

/// Sets the process-wide ready-to-end iteration default.
///
/// # Errors
///
/// Returns [`PhaseError::InvalidArgument`] when `max` is negative or does
/// not fit in a `u32`.
pub fn set_default_max_ready_to_end_iterations(max: i64) -> Result<(), PhaseError> {
    let bound = iteration_bound(max, "default_max_ready_to_end_iterations")?;
    DEFAULT_MAX_READY_TO_END.store(bound, Ordering::SeqCst);
    Ok(())
}

/// Restores process-wide defaults: the iteration default goes back to
/// [`DEFAULT_MAX_READY_TO_END_ITERATIONS`] and the common phases drop
/// their per-phase overrides.
pub fn reset_defaults() {
    DEFAULT_MAX_READY_TO_END.store(DEFAULT_MAX_READY_TO_END_ITERATIONS, Ordering::SeqCst);
    for phase in &common().phases {
        phase.clear_max_ready_to_end_iterations();
    }
}

pub(crate) fn iteration_bound(value: i64, what: &str) -> Result<u32, PhaseError> {
    u32::try_from(value).map_err(|_| {
        PhaseError::InvalidArgument(format!(
            "{what} must be a non-negative integer no larger than {}, got {value}",
            u32::MAX
        ))
    })
}
