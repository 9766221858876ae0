//! Structured event stream.
//!
//! Discrete, typed events emitted while the engine runs. Events are
//! serialized as newline-delimited JSON (JSONL) and carry a monotonically
//! increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::phase::TraversalPolicy;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during a run.
///
/// Each variant is tagged with `"type"` when serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A domain run began.
    RunStarted {
        /// When the run started.
        timestamp: DateTime<Utc>,
        /// Run identifier.
        run_id: Uuid,
        /// Domain being run.
        domain: String,
        /// Phases in run order.
        phases: Vec<String>,
    },

    /// A phase entered STARTED.
    PhaseStarted {
        /// When the phase started.
        timestamp: DateTime<Utc>,
        /// Run identifier.
        run_id: Uuid,
        /// Phase name.
        phase: String,
        /// Phase traversal policy.
        policy: TraversalPolicy,
    },

    /// A component's task body failed.
    TaskFailed {
        /// When the failure was collected.
        timestamp: DateTime<Utc>,
        /// Run identifier.
        run_id: Uuid,
        /// Phase the task belonged to.
        phase: String,
        /// Failing component.
        component: String,
        /// Error message or panic payload.
        message: String,
        /// Whether the task panicked.
        panicked: bool,
    },

    /// A phase reached DONE.
    PhaseEnded {
        /// When the phase ended.
        timestamp: DateTime<Utc>,
        /// Run identifier.
        run_id: Uuid,
        /// Phase name.
        phase: String,
        /// Completed executions including this one.
        run_count: u64,
        /// Ready-to-end re-entries.
        ready_to_end_iterations: u32,
        /// Wall time in milliseconds.
        duration_ms: u64,
    },

    /// The run finished, normally or through cancellation.
    RunCompleted {
        /// When the run finished.
        timestamp: DateTime<Utc>,
        /// Run identifier.
        run_id: Uuid,
        /// Phases executed.
        phases_run: usize,
        /// Task failures across all phases.
        task_failures: usize,
        /// Whether the run was cancelled.
        cancelled: bool,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization or I/O failures are dropped; a broken event sink never
/// fails a run.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
