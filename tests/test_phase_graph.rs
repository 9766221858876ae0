mod common;

use std::sync::Arc;

use tbphase::error::PhaseError;
use tbphase::phase::{
    COMMON_DOMAIN, CommonPhase, GraphKind, PhaseGraph, PhaseNode, Placement, TraversalPolicy,
    common_phase, get_common_domain, get_domain, get_domains, register_domain,
};

use common::{member, unique_name};

fn names(nodes: &[Arc<PhaseNode>]) -> Vec<String> {
    nodes.iter().map(|n| n.name().to_owned()).collect()
}

#[test]
fn common_domain_is_built_once_in_canonical_order() {
    let first = get_common_domain();
    let second = get_domain(COMMON_DOMAIN).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.kind(), GraphKind::Domain);
    assert_eq!(
        first.phase_names(),
        [
            "build_phase",
            "connect_phase",
            "end_of_elaboration_phase",
            "start_of_simulation_phase",
            "run_phase",
            "extract_phase",
            "check_phase",
            "report_phase",
            "final_phase",
        ]
    );
    assert!(Arc::ptr_eq(
        &common_phase(CommonPhase::Run),
        &first.find_by_name("run_phase", true).unwrap()
    ));
}

#[test]
fn common_phases_form_a_chain() {
    let connect = common_phase(CommonPhase::Connect);
    assert_eq!(names(&connect.predecessors()), ["build_phase"]);
    assert_eq!(names(&connect.successors()), ["end_of_elaboration_phase"]);
    assert!(common_phase(CommonPhase::Build).predecessors().is_empty());
    assert!(common_phase(CommonPhase::Final).successors().is_empty());
}

#[test]
fn duplicate_insert_leaves_member_count_unchanged() {
    let domain = PhaseGraph::new_domain(unique_name("dup"));
    domain
        .add(PhaseNode::new("reset", TraversalPolicy::Task), Placement::Append)
        .unwrap();
    domain
        .add(PhaseNode::new("configure", TraversalPolicy::Task), Placement::Append)
        .unwrap();

    let err = domain
        .add(PhaseNode::new("reset", TraversalPolicy::Task), Placement::Append)
        .unwrap_err();
    assert!(matches!(err, PhaseError::DuplicatePhase { ref phase, .. } if phase == "reset"));
    assert_eq!(domain.len(), 2);
    assert_eq!(domain.phase_names(), ["reset", "configure"]);
}

#[test]
fn user_domain_with_runtime_schedule() {
    let domain = PhaseGraph::new_domain(unique_name("uvm"));
    domain
        .add(PhaseNode::new("pre_reset", TraversalPolicy::Task), Placement::Append)
        .unwrap();
    domain
        .add(PhaseNode::new("post_shutdown", TraversalPolicy::Task), Placement::Append)
        .unwrap();

    let schedule = PhaseGraph::new_schedule("runtime");
    for name in ["reset", "main", "shutdown"] {
        schedule
            .add(PhaseNode::new(name, TraversalPolicy::Task), Placement::Append)
            .unwrap();
    }
    domain
        .add_schedule(&schedule, Placement::after("pre_reset"))
        .unwrap();

    assert_eq!(
        domain.phase_names(),
        ["pre_reset", "reset", "main", "shutdown", "post_shutdown"]
    );
    let reset = member(&domain, "reset");
    assert_eq!(names(&reset.predecessors()), ["pre_reset"]);
    assert_eq!(names(&member(&domain, "shutdown").successors()), ["post_shutdown"]);
    assert!(Arc::ptr_eq(&reset.domain().unwrap(), &domain));
    assert!(Arc::ptr_eq(&schedule.domain().unwrap(), &domain));
}

#[test]
fn registered_domain_is_visible_to_global_lookup() {
    let name = unique_name("registered");
    let domain = PhaseGraph::new_domain(&name);
    domain
        .add(PhaseNode::new("scoreboard_flush", TraversalPolicy::BottomUp), Placement::Append)
        .unwrap();
    register_domain(&domain).unwrap();

    assert!(get_domains().contains_key(&name));
    assert!(Arc::ptr_eq(&get_domain(&name).unwrap(), &domain));

    let from_common = get_common_domain()
        .find_by_name("scoreboard_flush", false)
        .unwrap();
    assert_eq!(from_common.name(), "scoreboard_flush");

    let err = get_common_domain()
        .find_by_name("scoreboard_flush", true)
        .unwrap_err();
    assert!(matches!(err, PhaseError::NotFound { .. }));

    let again = register_domain(&PhaseGraph::new_domain(&name)).unwrap_err();
    assert!(matches!(again, PhaseError::InvalidArgument(_)));
}

#[test]
fn misspelled_lookup_suggests_phase() {
    let err = common_phase(CommonPhase::Build)
        .find_by_name("conect_phase", true)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "phase not found: conect_phase (did you mean 'connect_phase'?)"
    );
}

#[test]
fn schedules_cannot_be_registered() {
    let schedule = PhaseGraph::new_schedule(unique_name("sched"));
    assert!(matches!(
        register_domain(&schedule),
        Err(PhaseError::InvalidArgument(_))
    ));
}
