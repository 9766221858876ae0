//! Task concurrency supervisor for TASK phases.
//!
//! One supervisor covers one execution of one TASK phase. Each component
//! gets its own tokio task; a shared atomic counter tracks how many have not
//! yet returned. `spawn` never waits: deciding when EXECUTING may end is up
//! to the caller, through [`TaskSupervisor::wait_idle`] or
//! [`TaskSupervisor::cancel_all`].
//!
//! Failures never escape a unit. An error return or a panic inside
//! `run_phase` is converted into a [`TaskFailure`] and sent on the
//! supervisor's failure channel.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::component::Component;
use crate::error::{PhaseError, TaskFailure};
use crate::phase::PhaseNode;
use crate::sync::lock;

/// Tracks the concurrent units spawned for one TASK-phase execution.
pub struct TaskSupervisor {
    /// Units spawned but not yet returned
    pending: Arc<AtomicUsize>,
    /// Units spawned over the supervisor's lifetime
    spawned: AtomicUsize,
    /// Signalled when `pending` drops to zero
    idle: Arc<Notify>,
    cancel: CancellationToken,
    failures_tx: mpsc::UnboundedSender<TaskFailure>,
    failures_rx: Mutex<mpsc::UnboundedReceiver<TaskFailure>>,
}

/// Decrements the pending counter when a unit finishes, however it
/// finishes (return, panic, cancellation or runtime shutdown).
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    /// Creates a supervisor with no units.
    #[must_use]
    pub fn new() -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicUsize::new(0),
            idle: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            failures_tx,
            failures_rx: Mutex::new(failures_rx),
        }
    }

    /// Spawns `component.run_phase(phase)` as its own tokio task.
    ///
    /// The pending counter is incremented before the task is spawned and
    /// decremented when it returns.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotConfigured`] when called outside a tokio
    /// runtime.
    pub fn spawn(
        &self,
        component: Arc<dyn Component>,
        phase: Arc<PhaseNode>,
    ) -> Result<(), PhaseError> {
        let handle = Handle::try_current().map_err(|_| {
            PhaseError::NotConfigured(format!(
                "task phase '{}' needs a tokio runtime",
                phase.name()
            ))
        })?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            idle: Arc::clone(&self.idle),
        };
        let cancel = self.cancel.clone();
        let failures = self.failures_tx.clone();

        handle.spawn(async move {
            let _guard = guard;
            let component_name = component.name().to_owned();
            let phase_name = phase.name().to_owned();

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(component = %component_name, phase = %phase_name, "task cancelled");
                    return;
                }
                outcome = AssertUnwindSafe(component.run_phase(phase)).catch_unwind() => outcome,
            };

            let failure = match outcome {
                Ok(Ok(())) => {
                    debug!(component = %component_name, phase = %phase_name, "task returned");
                    return;
                }
                Ok(Err(e)) => TaskFailure {
                    component: component_name,
                    phase: phase_name,
                    message: e.to_string(),
                    panicked: false,
                },
                Err(payload) => TaskFailure {
                    component: component_name,
                    phase: phase_name,
                    message: panic_message(payload.as_ref()),
                    panicked: true,
                },
            };
            warn!(
                component = %failure.component,
                phase = %failure.phase,
                panicked = failure.panicked,
                error = %failure.message,
                "task failed"
            );
            let _ = failures.send(failure);
        });
        Ok(())
    }

    /// Units that have not yet returned.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Units spawned so far.
    #[must_use]
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Waits until every spawned unit has returned.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Cancels every outstanding unit. Units not yet polled never run.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`cancel_all`](Self::cancel_all) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Takes every failure reported so far.
    #[must_use]
    pub fn drain_failures(&self) -> Vec<TaskFailure> {
        let mut rx = lock(&self.failures_rx);
        let mut failures = Vec::new();
        while let Ok(failure) = rx.try_recv() {
            failures.push(failure);
        }
        failures
    }
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("pending", &self.pending())
            .field("spawned", &self.spawned())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_owned())
}
