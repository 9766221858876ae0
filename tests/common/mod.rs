//! Shared integration-test harness: a recording component, tree builders
//! and helpers for spawning the `tbphase` binary.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::Output;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tbphase::component::{Component, HookError, PhaseSequencer, PhaseSlot};
use tbphase::phase::{PhaseGraph, PhaseNode, Placement, TraversalPolicy};

/// Hook log shared by every recorder in a tree.
pub type Log = Arc<Mutex<Vec<String>>>;

/// Creates an empty hook log.
pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Returns a snapshot of the log entries.
#[allow(clippy::missing_panics_doc)]
pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Returns the log entries for one hook, in order, as component names.
#[allow(clippy::missing_panics_doc)]
pub fn hook_order(log: &Log, hook: &str) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| {
            let mut parts = e.splitn(3, ':');
            let name = parts.next()?;
            (parts.next()? == hook).then(|| name.to_owned())
        })
        .collect()
}

/// Component that records every hook as `name:hook:phase`.
pub struct Recorder {
    name: String,
    domain: String,
    children: Vec<Arc<dyn Component>>,
    slot: PhaseSlot,
    log: Log,
    run_for: Duration,
    fail: Option<String>,
    panic: bool,
    with_sequencer: bool,
}

impl Recorder {
    /// A leaf in the `tb` domain.
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_owned(),
            domain: TB_DOMAIN.to_owned(),
            children: Vec::new(),
            slot: PhaseSlot::new(),
            log: Arc::clone(log),
            run_for: Duration::ZERO,
            fail: None,
            panic: false,
            with_sequencer: false,
        }
    }

    pub fn children(mut self, children: Vec<Arc<dyn Component>>) -> Self {
        self.children = children;
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_owned();
        self
    }

    pub const fn run_for(mut self, run_for: Duration) -> Self {
        self.run_for = run_for;
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.fail = Some(message.to_owned());
        self
    }

    pub const fn panics(mut self) -> Self {
        self.panic = true;
        self
    }

    pub const fn sequencer(mut self) -> Self {
        self.with_sequencer = true;
        self
    }

    pub fn arc(self) -> Arc<dyn Component> {
        Arc::new(self)
    }

    fn record(&self, hook: &str, phase: &PhaseNode) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{hook}:{}", self.name, phase.name()));
    }
}

#[async_trait]
impl Component for Recorder {
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
        self.record("started", phase);
    }

    fn execute(&self, phase: &PhaseNode) -> Result<(), HookError> {
        self.record("execute", phase);
        match &self.fail {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    async fn run_phase(&self, phase: Arc<PhaseNode>) -> Result<(), HookError> {
        self.record("run", &phase);
        if !self.run_for.is_zero() {
            tokio::time::sleep(self.run_for).await;
        }
        assert!(!self.panic, "{} panicked", self.name);
        match &self.fail {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    fn phase_ready_to_end(&self, phase: &PhaseNode) {
        self.record("ready_to_end", phase);
    }

    fn phase_ended(&self, phase: &PhaseNode) {
        self.record("ended", phase);
    }

    fn sequencer(&self) -> Option<&dyn PhaseSequencer> {
        self.with_sequencer.then_some(self as &dyn PhaseSequencer)
    }
}

impl PhaseSequencer for Recorder {
    fn start_phase_sequence(&self, phase: &PhaseNode) {
        self.record("seq_start", phase);
    }

    fn stop_phase_sequence(&self, phase: &PhaseNode) {
        self.record("seq_stop", phase);
    }
}

/// Builds `root -> [a -> [a1], b]`.
pub fn sample_tree(log: &Log) -> Arc<dyn Component> {
    Recorder::new("root", log)
        .children(vec![
            Recorder::new("a", log)
                .children(vec![Recorder::new("a1", log).arc()])
                .arc(),
            Recorder::new("b", log).arc(),
        ])
        .arc()
}

/// Returns a domain name no other test in the binary uses.
pub fn unique_name(prefix: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("{prefix}_{}", NEXT.fetch_add(1, Ordering::SeqCst))
}

/// Domain every [`Recorder`] belongs to unless told otherwise.
pub const TB_DOMAIN: &str = "tb";

/// Creates an unregistered `tb` domain holding `phases`, appended in order.
#[allow(clippy::missing_panics_doc)]
pub fn tb_domain(phases: &[(&str, TraversalPolicy)]) -> Arc<PhaseGraph> {
    let domain = PhaseGraph::new_domain(TB_DOMAIN);
    for (name, policy) in phases {
        domain
            .add(PhaseNode::new(*name, *policy), Placement::Append)
            .unwrap();
    }
    domain
}

/// Looks up a member of `graph` by name.
#[allow(clippy::missing_panics_doc)]
pub fn member(graph: &Arc<PhaseGraph>, name: &str) -> Arc<PhaseNode> {
    graph.find_by_name(name, true).unwrap()
}

// ============================================================================
// Binary helpers
// ============================================================================

/// Path to a file under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Runs the `tbphase` binary to completion with logging silenced.
#[allow(clippy::missing_panics_doc)]
pub fn run_cli(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_tbphase"))
        .args(args)
        .arg("--quiet")
        .env_remove("TBPHASE_LOG_LEVEL")
        .output()
        .expect("failed to run tbphase")
}
