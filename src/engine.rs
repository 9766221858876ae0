//! Phase engine: the scheduler layer above traversal.
//!
//! The `PhaseEngine` drives one component tree through the phases of a
//! domain, in member order. Each phase moves through
//! SCHEDULED, SYNCING, STARTED, EXECUTING, READY_TO_END, ENDED, CLEANUP and
//! DONE; the four enacted states are traversed over the tree, the others are
//! bookkeeping only.
//!
//! TASK phases leave EXECUTING once every unit has returned, the optional
//! task timeout elapses, or the engine is cancelled. The last two cancel
//! whatever is still outstanding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::component::Component;
use crate::error::{PhaseError, TaskFailure};
use crate::objection::{NoObjections, ObjectionQuery};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::phase::{GraphKind, PhaseGraph, PhaseNode, PhaseState, TraversalPolicy};
use crate::ready_to_end::run_ready_to_end;
use crate::supervisor::TaskSupervisor;
use crate::traversal::traverse;

/// Runtime knobs of a [`PhaseEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound on the EXECUTING state of a TASK phase; `None` waits for
    /// every unit to return.
    pub task_timeout: Option<Duration>,
}

/// Outcome of one phase execution.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    /// Phase name
    pub phase: String,
    /// Phase traversal policy
    pub policy: TraversalPolicy,
    /// Concurrent units spawned while EXECUTING (TASK phases only)
    pub tasks_spawned: usize,
    /// Units that returned an error or panicked
    pub task_failures: Vec<TaskFailure>,
    /// READY_TO_END passes after the first one
    pub ready_to_end_iterations: u32,
    /// Whether the ready-to-end bound ended the phase with objections pending
    pub bound_reached: bool,
    /// Whether the task timeout cut EXECUTING short
    pub timed_out: bool,
    /// Whether cancellation cut EXECUTING short
    pub cancelled: bool,
    /// Wall time from SCHEDULED to DONE
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

/// Outcome of a whole domain run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier shared by every event of the run
    pub run_id: Uuid,
    /// Domain that was run
    pub domain: String,
    /// One report per phase that ran, in run order
    pub phases: Vec<PhaseReport>,
    /// Whether the run was cancelled before every phase ran
    pub cancelled: bool,
}

impl RunSummary {
    /// Total task failures across all phases.
    #[must_use]
    pub fn task_failure_count(&self) -> usize {
        self.phases.iter().map(|p| p.task_failures.len()).sum()
    }

    /// Returns the report of the named phase, if it ran.
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == name)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// How EXECUTING of a TASK phase came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskWait {
    Idle,
    TimedOut,
    Cancelled,
}

/// Drives a component tree through the phases of a domain.
pub struct PhaseEngine {
    root: Arc<dyn Component>,
    objections: Arc<dyn ObjectionQuery>,
    options: EngineOptions,
    events: Arc<EventEmitter>,
    cancel: CancellationToken,
    run_id: Uuid,
}

impl PhaseEngine {
    /// Creates an engine for the tree under `root` with no objections,
    /// no task timeout and a discarding event sink.
    #[must_use]
    pub fn new(root: Arc<dyn Component>) -> Self {
        Self {
            root,
            objections: Arc::new(NoObjections),
            options: EngineOptions::default(),
            events: Arc::new(EventEmitter::noop()),
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Sets the objection query consulted during READY_TO_END.
    #[must_use]
    pub fn with_objections(mut self, objections: Arc<dyn ObjectionQuery>) -> Self {
        self.objections = objections;
        self
    }

    /// Sets runtime options.
    #[must_use]
    pub const fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the structured event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// Identifier stamped on every event of this engine's runs.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns a token that cancels the engine when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the engine: the current phase is finished without waiting
    /// for outstanding task units, and later phases are skipped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs every phase of `domain` in member order.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidArgument`] if `domain` is a schedule,
    /// and otherwise the first error raised by any phase; the remaining
    /// phases are not run.
    pub async fn run_domain(&self, domain: &Arc<PhaseGraph>) -> Result<RunSummary, PhaseError> {
        if domain.kind() != GraphKind::Domain {
            return Err(PhaseError::InvalidArgument(format!(
                "'{}' is a schedule; only domains can be run",
                domain.name()
            )));
        }
        let phases = domain.phases();
        info!(run_id = %self.run_id, domain = %domain.name(), phases = phases.len(), "run started");
        self.events.emit(Event::RunStarted {
            timestamp: Utc::now(),
            run_id: self.run_id,
            domain: domain.name().to_owned(),
            phases: domain.phase_names(),
        });

        let mut reports = Vec::with_capacity(phases.len());
        for phase in &phases {
            if self.cancel.is_cancelled() {
                info!(
                    skipped = phases.len() - reports.len(),
                    "run cancelled, skipping remaining phases"
                );
                break;
            }
            reports.push(self.run_phase(phase).await?);
        }

        let summary = RunSummary {
            run_id: self.run_id,
            domain: domain.name().to_owned(),
            phases: reports,
            cancelled: self.cancel.is_cancelled(),
        };
        self.events.emit(Event::RunCompleted {
            timestamp: Utc::now(),
            run_id: self.run_id,
            phases_run: summary.phases.len(),
            task_failures: summary.task_failure_count(),
            cancelled: summary.cancelled,
        });
        info!(
            run_id = %self.run_id,
            phases_run = summary.phases.len(),
            task_failures = summary.task_failure_count(),
            cancelled = summary.cancelled,
            "run completed"
        );
        Ok(summary)
    }

    /// Runs a single phase from SCHEDULED to DONE.
    ///
    /// # Errors
    ///
    /// Returns any traversal or ready-to-end error. The phase is left in
    /// the state it had reached and its run count is not incremented.
    pub async fn run_phase(&self, phase: &Arc<PhaseNode>) -> Result<PhaseReport, PhaseError> {
        let begin = Instant::now();
        let tasks = TaskSupervisor::new();

        self.transition(phase, PhaseState::Scheduled);
        self.transition(phase, PhaseState::Syncing);

        self.transition(phase, PhaseState::Started);
        info!(phase = %phase.name(), policy = %phase.policy(), "phase started");
        self.events.emit(Event::PhaseStarted {
            timestamp: Utc::now(),
            run_id: self.run_id,
            phase: phase.name().to_owned(),
            policy: phase.policy(),
        });
        traverse(&self.root, phase, PhaseState::Started, &tasks)?;

        self.transition(phase, PhaseState::Executing);
        if let Err(e) = traverse(&self.root, phase, PhaseState::Executing, &tasks) {
            tasks.cancel_all();
            return Err(e);
        }
        let wait = if phase.policy() == TraversalPolicy::Task {
            self.await_tasks(phase, &tasks).await
        } else {
            TaskWait::Idle
        };

        let task_failures = tasks.drain_failures();
        if !task_failures.is_empty() {
            metrics::record_task_failures(phase.name(), task_failures.len() as u64);
        }
        for failure in &task_failures {
            self.events.emit(Event::TaskFailed {
                timestamp: Utc::now(),
                run_id: self.run_id,
                phase: failure.phase.clone(),
                component: failure.component.clone(),
                message: failure.message.clone(),
                panicked: failure.panicked,
            });
        }

        self.transition(phase, PhaseState::ReadyToEnd);
        let rte = run_ready_to_end(&self.root, phase, &tasks, self.objections.as_ref())?;
        metrics::record_ready_to_end_iterations(phase.name(), rte.iterations);

        self.transition(phase, PhaseState::Ended);
        traverse(&self.root, phase, PhaseState::Ended, &tasks)?;

        self.transition(phase, PhaseState::Cleanup);
        self.transition(phase, PhaseState::Done);
        let run_count = phase.increment_run_count();

        let duration = begin.elapsed();
        metrics::record_phase_duration(phase.name(), duration);
        self.events.emit(Event::PhaseEnded {
            timestamp: Utc::now(),
            run_id: self.run_id,
            phase: phase.name().to_owned(),
            run_count,
            ready_to_end_iterations: rte.iterations,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        });
        info!(
            phase = %phase.name(),
            run_count,
            task_failures = task_failures.len(),
            ready_to_end_iterations = rte.iterations,
            duration_ms = duration.as_millis(),
            "phase ended"
        );

        Ok(PhaseReport {
            phase: phase.name().to_owned(),
            policy: phase.policy(),
            tasks_spawned: tasks.spawned(),
            task_failures,
            ready_to_end_iterations: rte.iterations,
            bound_reached: rte.bound_reached,
            timed_out: wait == TaskWait::TimedOut,
            cancelled: wait == TaskWait::Cancelled,
            duration,
        })
    }

    /// Waits for the EXECUTING state of a TASK phase to finish.
    async fn await_tasks(&self, phase: &PhaseNode, tasks: &TaskSupervisor) -> TaskWait {
        metrics::set_tasks_pending(phase.name(), tasks.pending());
        let timeout = async {
            match self.options.task_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let wait = tokio::select! {
            biased;
            () = tasks.wait_idle() => TaskWait::Idle,
            () = self.cancel.cancelled() => {
                info!(
                    phase = %phase.name(),
                    pending = tasks.pending(),
                    "cancelled while executing"
                );
                TaskWait::Cancelled
            }
            () = timeout => {
                warn!(
                    phase = %phase.name(),
                    pending = tasks.pending(),
                    "task timeout elapsed, cancelling outstanding units"
                );
                TaskWait::TimedOut
            }
        };

        if wait != TaskWait::Idle {
            tasks.cancel_all();
            tasks.wait_idle().await;
        }
        metrics::set_tasks_pending(phase.name(), tasks.pending());
        wait
    }

    fn transition(&self, phase: &PhaseNode, next: PhaseState) {
        let previous = phase.set_state(next);
        metrics::record_phase_transition(phase.name(), previous, next);
        debug!(
            run_id = %self.run_id,
            phase = %phase.name(),
            from = %previous,
            to = %next,
            "phase transition"
        );
    }
}

impl std::fmt::Debug for PhaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseEngine")
            .field("root", &self.root.name())
            .field("run_id", &self.run_id)
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
