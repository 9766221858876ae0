//! Phase graphs: domains and schedules.
//!
//! A graph keeps its members in run order and maintains predecessor and
//! successor edges between them as phases are inserted. Every insertion is
//! validated in full before the member list or any edge is touched, so a
//! failed `add` leaves the graph exactly as it was.

use std::sync::{Arc, OnceLock, RwLock, Weak};

use tracing::debug;

use crate::error::PhaseError;
use crate::sync::{read, write};

use super::node::PhaseNode;
use super::registry;

/// Whether a graph is a root-level domain or an insertable schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    /// Named root graph components can belong to.
    Domain,
    /// Sub-graph that can be spliced into a domain.
    Schedule,
}

/// Where [`PhaseGraph::add`] places a new phase.
///
/// Anchors are phase names that must already be members of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Placement {
    /// After every current sink, in arrival order.
    #[default]
    Append,
    /// Between the anchor and its former successors.
    After(String),
    /// Between the anchor's former predecessors and the anchor.
    Before(String),
    /// In parallel with the anchor, ordered just before it.
    StartWith(String),
    /// In parallel with the anchor, ordered just after it.
    EndWith(String),
}

impl Placement {
    /// Shorthand for [`Placement::After`].
    #[must_use]
    pub fn after(anchor: impl Into<String>) -> Self {
        Self::After(anchor.into())
    }

    /// Shorthand for [`Placement::Before`].
    #[must_use]
    pub fn before(anchor: impl Into<String>) -> Self {
        Self::Before(anchor.into())
    }

    /// Shorthand for [`Placement::StartWith`].
    #[must_use]
    pub fn start_with(anchor: impl Into<String>) -> Self {
        Self::StartWith(anchor.into())
    }

    /// Shorthand for [`Placement::EndWith`].
    #[must_use]
    pub fn end_with(anchor: impl Into<String>) -> Self {
        Self::EndWith(anchor.into())
    }

    fn anchor(&self) -> Option<&str> {
        match self {
            Self::Append => None,
            Self::After(a) | Self::Before(a) | Self::StartWith(a) | Self::EndWith(a) => Some(a),
        }
    }
}

/// Placement resolved against the current member list.
#[derive(Clone, Copy)]
enum Slot {
    Tail,
    After(usize),
    Before(usize),
    With { index: usize, at_end: bool },
}

/// A named, ordered collection of phase nodes.
pub struct PhaseGraph {
    name: String,
    kind: GraphKind,
    members: RwLock<Vec<Arc<PhaseNode>>>,
    /// Domain a schedule was spliced into
    parent: OnceLock<Weak<Self>>,
}

impl PhaseGraph {
    /// Creates an empty, unregistered domain.
    ///
    /// Use [`register_domain`](super::registry::register_domain) to make it
    /// visible to registry-wide lookups.
    #[must_use]
    pub fn new_domain(name: impl Into<String>) -> Arc<Self> {
        Self::with_kind(name.into(), GraphKind::Domain)
    }

    /// Creates an empty schedule.
    #[must_use]
    pub fn new_schedule(name: impl Into<String>) -> Arc<Self> {
        Self::with_kind(name.into(), GraphKind::Schedule)
    }

    fn with_kind(name: String, kind: GraphKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            members: RwLock::new(Vec::new()),
            parent: OnceLock::new(),
        })
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether this is a domain or a schedule.
    #[must_use]
    pub const fn kind(&self) -> GraphKind {
        self.kind
    }

    /// Returns the number of member phases.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.members).len()
    }

    /// Returns `true` when the graph has no phases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.members).is_empty()
    }

    /// Snapshot of the members in run order.
    #[must_use]
    pub fn phases(&self) -> Vec<Arc<PhaseNode>> {
        read(&self.members).clone()
    }

    /// Member names in run order.
    #[must_use]
    pub fn phase_names(&self) -> Vec<String> {
        read(&self.members)
            .iter()
            .map(|p| p.name().to_owned())
            .collect()
    }

    /// Returns `true` if a member is named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        read(&self.members).iter().any(|p| p.name() == name)
    }

    /// Returns the domain a schedule was spliced into.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Returns the owning domain: the graph itself for a domain, the
    /// parent for a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotConfigured`] for a schedule that has not
    /// been added to a domain.
    pub fn domain(self: &Arc<Self>) -> Result<Arc<Self>, PhaseError> {
        match self.kind {
            GraphKind::Domain => Ok(Arc::clone(self)),
            GraphKind::Schedule => self.parent().ok_or_else(|| {
                PhaseError::NotConfigured(format!(
                    "schedule '{}' has not been added to a domain",
                    self.name
                ))
            }),
        }
    }

    /// Inserts `phase` into the graph.
    ///
    /// # Errors
    ///
    /// - [`PhaseError::DuplicatePhase`] if a member already has the name
    /// - [`PhaseError::UnknownAnchor`] if the placement anchor is not a member
    /// - [`PhaseError::InvalidArgument`] if `phase` already belongs to a graph
    pub fn add(
        self: &Arc<Self>,
        phase: Arc<PhaseNode>,
        placement: Placement,
    ) -> Result<(), PhaseError> {
        let mut members = write(&self.members);
        self.check_duplicate(&members, phase.name())?;
        let slot = self.resolve(&members, &placement)?;
        if !phase.attach(self) {
            return Err(PhaseError::InvalidArgument(format!(
                "phase '{}' already belongs to a graph",
                phase.name()
            )));
        }
        debug!(graph = %self.name, phase = %phase.name(), ?placement, "phase added");
        splice(&mut members, std::slice::from_ref(&phase), slot);
        Ok(())
    }

    /// Splices every member of `schedule` into this domain as one block.
    ///
    /// The schedule's internal edges are kept; its entry phases inherit the
    /// placement's predecessors and its exit phases the successors.
    /// Phases added to the schedule afterwards are not reflected here.
    ///
    /// # Errors
    ///
    /// - [`PhaseError::InvalidArgument`] if this graph is not a domain,
    ///   `schedule` is not a schedule, or it was already added elsewhere
    /// - [`PhaseError::DuplicatePhase`] if any schedule phase name clashes
    /// - [`PhaseError::UnknownAnchor`] if the anchor is not a member
    pub fn add_schedule(
        self: &Arc<Self>,
        schedule: &Arc<Self>,
        placement: Placement,
    ) -> Result<(), PhaseError> {
        if self.kind != GraphKind::Domain || schedule.kind != GraphKind::Schedule {
            return Err(PhaseError::InvalidArgument(format!(
                "can only add a schedule to a domain ('{}' into '{}')",
                schedule.name, self.name
            )));
        }
        let block = schedule.phases();

        let mut members = write(&self.members);
        for phase in &block {
            self.check_duplicate(&members, phase.name())?;
        }
        let slot = self.resolve(&members, &placement)?;
        if schedule.parent.set(Arc::downgrade(self)).is_err() {
            return Err(PhaseError::InvalidArgument(format!(
                "schedule '{}' already belongs to a domain",
                schedule.name
            )));
        }
        debug!(
            domain = %self.name,
            schedule = %schedule.name,
            phases = block.len(),
            ?placement,
            "schedule added"
        );
        splice(&mut members, &block, slot);
        Ok(())
    }

    /// Appends freshly created nodes without validation.
    pub(crate) fn append_all(self: &Arc<Self>, phases: &[Arc<PhaseNode>]) {
        let mut members = write(&self.members);
        for phase in phases {
            phase.attach(self);
            splice(&mut members, std::slice::from_ref(phase), Slot::Tail);
        }
    }

    /// Finds a phase by name.
    ///
    /// With `stay_in_scope` only this graph and its domain are searched;
    /// otherwise every registered domain is searched after them.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotFound`], with the closest in-scope name as
    /// a suggestion when one is near enough.
    pub fn find_by_name(
        self: &Arc<Self>,
        name: &str,
        stay_in_scope: bool,
    ) -> Result<Arc<PhaseNode>, PhaseError> {
        find_by_name_in(&self.scopes(stay_in_scope), name)
    }

    /// Finds the member identical to `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotFound`] when `phase` is not in scope.
    pub fn find(
        self: &Arc<Self>,
        phase: &PhaseNode,
        stay_in_scope: bool,
    ) -> Result<Arc<PhaseNode>, PhaseError> {
        find_in(&self.scopes(stay_in_scope), phase)
    }

    fn scopes(self: &Arc<Self>, stay_in_scope: bool) -> Vec<Arc<Self>> {
        let mut scopes = vec![Arc::clone(self)];
        if let Ok(domain) = self.domain() {
            if !Arc::ptr_eq(&domain, self) {
                scopes.push(domain);
            }
        }
        if !stay_in_scope {
            for domain in registry::get_domains().into_values() {
                if !scopes.iter().any(|s| Arc::ptr_eq(s, &domain)) {
                    scopes.push(domain);
                }
            }
        }
        scopes
    }

    fn check_duplicate(&self, members: &[Arc<PhaseNode>], name: &str) -> Result<(), PhaseError> {
        if members.iter().any(|p| p.name() == name) {
            return Err(PhaseError::DuplicatePhase {
                phase: name.to_owned(),
                graph: self.name.clone(),
            });
        }
        Ok(())
    }

    fn resolve(
        &self,
        members: &[Arc<PhaseNode>],
        placement: &Placement,
    ) -> Result<Slot, PhaseError> {
        let Some(anchor) = placement.anchor() else {
            return Ok(Slot::Tail);
        };
        let index = members
            .iter()
            .position(|p| p.name() == anchor)
            .ok_or_else(|| PhaseError::UnknownAnchor {
                anchor: anchor.to_owned(),
                graph: self.name.clone(),
            })?;
        Ok(match placement {
            Placement::Append => Slot::Tail,
            Placement::After(_) => Slot::After(index),
            Placement::Before(_) => Slot::Before(index),
            Placement::StartWith(_) => Slot::With { index, at_end: false },
            Placement::EndWith(_) => Slot::With { index, at_end: true },
        })
    }
}

impl std::fmt::Debug for PhaseGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseGraph")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("phases", &self.phase_names())
            .finish_non_exhaustive()
    }
}

/// Links `block` into the member list at `slot` and inserts it in run
/// order. Entry phases are the block members without predecessors, exit
/// phases those without successors.
fn splice(members: &mut Vec<Arc<PhaseNode>>, block: &[Arc<PhaseNode>], slot: Slot) {
    let entries: Vec<_> = block
        .iter()
        .filter(|p| p.predecessors().is_empty())
        .cloned()
        .collect();
    let exits: Vec<_> = block
        .iter()
        .filter(|p| p.successors().is_empty())
        .cloned()
        .collect();

    let position = match slot {
        Slot::Tail => {
            for sink in members.iter().filter(|m| m.successors().is_empty()) {
                for entry in &entries {
                    PhaseNode::link(sink, entry);
                }
            }
            members.len()
        }
        Slot::After(index) => {
            let anchor = &members[index];
            for next in anchor.successors() {
                PhaseNode::unlink(anchor, &next);
                for exit in &exits {
                    PhaseNode::link(exit, &next);
                }
            }
            for entry in &entries {
                PhaseNode::link(anchor, entry);
            }
            index + 1
        }
        Slot::Before(index) => {
            let anchor = &members[index];
            for prev in anchor.predecessors() {
                PhaseNode::unlink(&prev, anchor);
                for entry in &entries {
                    PhaseNode::link(&prev, entry);
                }
            }
            for exit in &exits {
                PhaseNode::link(exit, anchor);
            }
            index
        }
        Slot::With { index, at_end } => {
            let anchor = &members[index];
            for prev in anchor.predecessors() {
                for entry in &entries {
                    PhaseNode::link(&prev, entry);
                }
            }
            for next in anchor.successors() {
                for exit in &exits {
                    PhaseNode::link(exit, &next);
                }
            }
            if at_end { index + 1 } else { index }
        }
    };

    members.splice(position..position, block.iter().cloned());
}

pub(crate) fn find_by_name_in(
    scopes: &[Arc<PhaseGraph>],
    name: &str,
) -> Result<Arc<PhaseNode>, PhaseError> {
    for graph in scopes {
        if let Some(found) = read(&graph.members).iter().find(|p| p.name() == name) {
            return Ok(Arc::clone(found));
        }
    }
    let candidates: Vec<String> = scopes.iter().flat_map(|g| g.phase_names()).collect();
    Err(PhaseError::NotFound {
        name: name.to_owned(),
        suggestion: suggest_phase(name, candidates.iter().map(String::as_str)),
    })
}

pub(crate) fn find_in(
    scopes: &[Arc<PhaseGraph>],
    phase: &PhaseNode,
) -> Result<Arc<PhaseNode>, PhaseError> {
    scopes
        .iter()
        .find_map(|graph| {
            read(&graph.members)
                .iter()
                .find(|p| std::ptr::eq(Arc::as_ptr(p), phase))
                .cloned()
        })
        .ok_or_else(|| PhaseError::NotFound {
            name: phase.name().to_owned(),
            suggestion: None,
        })
}

/// Suggest a similar phase name for typo correction.
///
/// Returns the closest match if its Damerau-Levenshtein distance is ≤ 3.
#[must_use]
pub fn suggest_phase<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    candidates
        .into_iter()
        .map(|name| (name, strsim::damerau_levenshtein(input, name)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::TraversalPolicy;

    fn node(name: &str) -> Arc<PhaseNode> {
        PhaseNode::new(name, TraversalPolicy::BottomUp)
    }

    fn names(nodes: &[Arc<PhaseNode>]) -> Vec<String> {
        nodes.iter().map(|n| n.name().to_owned()).collect()
    }

    fn chain(graph: &Arc<PhaseGraph>, names: &[&str]) {
        for name in names {
            graph.add(node(name), Placement::Append).unwrap();
        }
    }

    #[test]
    fn append_links_tail() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a", "b", "c"]);

        assert_eq!(graph.phase_names(), ["a", "b", "c"]);
        let b = graph.find_by_name("b", true).unwrap();
        assert_eq!(names(&b.predecessors()), ["a"]);
        assert_eq!(names(&b.successors()), ["c"]);
    }

    #[test]
    fn add_moves_node_to_dormant() {
        let graph = PhaseGraph::new_domain("d");
        let a = node("a");
        graph.add(Arc::clone(&a), Placement::Append).unwrap();
        assert_eq!(a.state(), crate::phase::PhaseState::Dormant);
        assert!(Arc::ptr_eq(&a.parent().unwrap(), &graph));
    }

    #[test]
    fn after_splices_between_anchor_and_successor() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a", "c"]);
        graph.add(node("b"), Placement::after("a")).unwrap();

        assert_eq!(graph.phase_names(), ["a", "b", "c"]);
        let a = graph.find_by_name("a", true).unwrap();
        let c = graph.find_by_name("c", true).unwrap();
        assert_eq!(names(&a.successors()), ["b"]);
        assert_eq!(names(&c.predecessors()), ["b"]);
    }

    #[test]
    fn before_splices_between_predecessor_and_anchor() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a", "c"]);
        graph.add(node("b"), Placement::before("c")).unwrap();

        assert_eq!(graph.phase_names(), ["a", "b", "c"]);
        let b = graph.find_by_name("b", true).unwrap();
        assert_eq!(names(&b.predecessors()), ["a"]);
        assert_eq!(names(&b.successors()), ["c"]);
    }

    #[test]
    fn start_with_and_end_with_run_in_parallel() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a", "b", "c"]);
        graph.add(node("b0"), Placement::start_with("b")).unwrap();
        graph.add(node("b1"), Placement::end_with("b")).unwrap();

        assert_eq!(graph.phase_names(), ["a", "b0", "b", "b1", "c"]);
        for parallel in ["b0", "b1"] {
            let p = graph.find_by_name(parallel, true).unwrap();
            assert_eq!(names(&p.predecessors()), ["a"]);
            assert_eq!(names(&p.successors()), ["c"]);
        }
        let c = graph.find_by_name("c", true).unwrap();
        assert_eq!(c.predecessors().len(), 3);
    }

    #[test]
    fn duplicate_name_is_rejected_without_change() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a", "b"]);
        let err = graph.add(node("a"), Placement::Append).unwrap_err();
        assert_eq!(
            err,
            PhaseError::DuplicatePhase {
                phase: "a".into(),
                graph: "d".into()
            }
        );
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn unknown_anchor_is_rejected_without_change() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["a"]);
        let orphan = node("b");
        let err = graph
            .add(Arc::clone(&orphan), Placement::after("zzz"))
            .unwrap_err();
        assert!(matches!(err, PhaseError::UnknownAnchor { ref anchor, .. } if anchor == "zzz"));
        assert_eq!(graph.len(), 1);
        assert!(orphan.parent().is_none());
    }

    #[test]
    fn node_cannot_join_two_graphs() {
        let first = PhaseGraph::new_domain("first");
        let second = PhaseGraph::new_domain("second");
        let shared = node("shared");
        first.add(Arc::clone(&shared), Placement::Append).unwrap();
        let err = second.add(shared, Placement::Append).unwrap_err();
        assert!(matches!(err, PhaseError::InvalidArgument(_)));
        assert!(second.is_empty());
    }

    #[test]
    fn schedule_splices_as_block() {
        let domain = PhaseGraph::new_domain("d");
        chain(&domain, &["build", "report"]);

        let schedule = PhaseGraph::new_schedule("runtime");
        chain(&schedule, &["reset", "main", "shutdown"]);
        domain
            .add_schedule(&schedule, Placement::after("build"))
            .unwrap();

        assert_eq!(
            domain.phase_names(),
            ["build", "reset", "main", "shutdown", "report"]
        );
        let report = domain.find_by_name("report", true).unwrap();
        assert_eq!(names(&report.predecessors()), ["shutdown"]);
        let main = domain.find_by_name("main", true).unwrap();
        assert!(Arc::ptr_eq(&main.domain().unwrap(), &domain));
        assert!(Arc::ptr_eq(&schedule.domain().unwrap(), &domain));
    }

    #[test]
    fn schedule_with_clashing_name_is_rejected_whole() {
        let domain = PhaseGraph::new_domain("d");
        chain(&domain, &["main"]);
        let schedule = PhaseGraph::new_schedule("s");
        chain(&schedule, &["pre", "main"]);

        let err = domain
            .add_schedule(&schedule, Placement::Append)
            .unwrap_err();
        assert!(matches!(err, PhaseError::DuplicatePhase { .. }));
        assert_eq!(domain.phase_names(), ["main"]);
        assert!(schedule.parent().is_none());
    }

    #[test]
    fn schedule_requires_domain_target() {
        let outer = PhaseGraph::new_schedule("outer");
        let inner = PhaseGraph::new_schedule("inner");
        let err = outer.add_schedule(&inner, Placement::Append).unwrap_err();
        assert!(matches!(err, PhaseError::InvalidArgument(_)));
    }

    #[test]
    fn unparented_schedule_has_no_domain() {
        let schedule = PhaseGraph::new_schedule("s");
        assert!(matches!(schedule.domain(), Err(PhaseError::NotConfigured(_))));
    }

    #[test]
    fn find_by_name_suggests_close_match() {
        let graph = PhaseGraph::new_domain("d");
        chain(&graph, &["connect_phase"]);
        let err = graph.find_by_name("conect_phase", true).unwrap_err();
        assert_eq!(
            err,
            PhaseError::NotFound {
                name: "conect_phase".into(),
                suggestion: Some("connect_phase".into())
            }
        );
    }

    #[test]
    fn find_by_identity() {
        let graph = PhaseGraph::new_domain("d");
        let a = node("a");
        graph.add(Arc::clone(&a), Placement::Append).unwrap();
        assert!(Arc::ptr_eq(&graph.find(&a, true).unwrap(), &a));

        let stranger = node("a");
        assert!(matches!(
            graph.find(&stranger, true),
            Err(PhaseError::NotFound { .. })
        ));
    }

    #[test]
    fn find_from_schedule_reaches_domain() {
        let domain = PhaseGraph::new_domain("d");
        chain(&domain, &["build"]);
        let schedule = PhaseGraph::new_schedule("s");
        chain(&schedule, &["main"]);
        domain.add_schedule(&schedule, Placement::Append).unwrap();

        assert_eq!(schedule.find_by_name("build", true).unwrap().name(), "build");
    }

    #[test]
    fn out_of_scope_search_reaches_common_domain() {
        let graph = PhaseGraph::new_domain("private");
        assert!(graph.find_by_name("build_phase", true).is_err());
        let build = graph.find_by_name("build_phase", false).unwrap();
        assert_eq!(build.policy(), TraversalPolicy::TopDown);
    }

    #[test]
    fn suggest_phase_respects_distance() {
        let names = ["build_phase", "run_phase"];
        assert_eq!(suggest_phase("buld_phase", names), Some("build_phase".into()));
        assert_eq!(suggest_phase("something_else", names), None);
    }
}
