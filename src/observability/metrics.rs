//! Metrics collection.
//!
//! Prometheus-compatible metrics for phase execution. Every recording
//! function is a no-op until [`init_metrics`] installs a recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TbPhaseError;
use crate::phase::PhaseState;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length for phase name labels.
const MAX_PHASE_LABEL_LEN: usize = 64;

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `TbPhaseError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), TbPhaseError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| TbPhaseError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "tbphase_phase_transitions_total",
        "Phase state transitions"
    );
    describe_histogram!(
        "tbphase_phase_duration_ms",
        "Wall time from SCHEDULED to DONE in milliseconds"
    );
    describe_gauge!(
        "tbphase_tasks_pending",
        "Task-phase units spawned but not yet returned"
    );
    describe_counter!(
        "tbphase_task_failures_total",
        "Task-phase units that returned an error or panicked"
    );
    describe_histogram!(
        "tbphase_ready_to_end_iterations",
        "Ready-to-end re-entries per phase execution"
    );
}

/// Records a phase state transition.
pub fn record_phase_transition(phase: &str, from: PhaseState, to: PhaseState) {
    counter!(
        "tbphase_phase_transitions_total",
        "phase" => sanitize_phase_label(phase),
        "from" => from.as_str(),
        "to" => to.as_str(),
    )
    .increment(1);
}

/// Records how long one phase execution took.
pub fn record_phase_duration(phase: &str, duration: Duration) {
    histogram!("tbphase_phase_duration_ms", "phase" => sanitize_phase_label(phase))
        .record(duration.as_secs_f64() * 1000.0);
}

/// Sets the pending task-unit gauge for a phase.
#[allow(clippy::cast_precision_loss)]
pub fn set_tasks_pending(phase: &str, pending: usize) {
    gauge!("tbphase_tasks_pending", "phase" => sanitize_phase_label(phase)).set(pending as f64);
}

/// Records task failures for a phase.
pub fn record_task_failures(phase: &str, count: u64) {
    counter!("tbphase_task_failures_total", "phase" => sanitize_phase_label(phase))
        .increment(count);
}

/// Records the ready-to-end re-entry count of one phase execution.
pub fn record_ready_to_end_iterations(phase: &str, iterations: u32) {
    histogram!(
        "tbphase_ready_to_end_iterations",
        "phase" => sanitize_phase_label(phase)
    )
    .record(f64::from(iterations));
}

/// Sanitizes a phase name for use as a metrics label.
///
/// Truncates to [`MAX_PHASE_LABEL_LEN`] characters and replaces any
/// characters invalid in Prometheus labels with underscores.
fn sanitize_phase_label(name: &str) -> String {
    name.chars()
        .take(MAX_PHASE_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_valid_names() {
        assert_eq!(sanitize_phase_label("run_phase"), "run_phase");
    }

    #[test]
    fn sanitize_replaces_and_truncates() {
        assert_eq!(sanitize_phase_label("main phase/1"), "main_phase_1");
        let long = "p".repeat(200);
        assert_eq!(sanitize_phase_label(&long).len(), MAX_PHASE_LABEL_LEN);
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_phase_transition("build_phase", PhaseState::Dormant, PhaseState::Scheduled);
        record_phase_duration("build_phase", Duration::from_millis(3));
        set_tasks_pending("run_phase", 4);
        record_task_failures("run_phase", 1);
        record_ready_to_end_iterations("check_phase", 2);
    }
}
