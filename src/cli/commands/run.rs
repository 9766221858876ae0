//! `run` command
//!
//! Builds a scripted component tree from a topology file, applies the
//! engine configuration, runs the common domain and prints the summary.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{OutputFormat, RunArgs};
use crate::config::{ConfigLoader, EngineConfig};
use crate::engine::{PhaseEngine, RunSummary};
use crate::error::TbPhaseError;
use crate::objection::{ObjectionQuery, Objections};
use crate::observability::{EventEmitter, init_metrics};
use crate::phase::get_common_domain;
use crate::topology::build_tree;

/// Run the common domain over the topology named in `args`.
///
/// # Errors
///
/// Returns an error if loading fails, the engine aborts, or any component
/// task failed ([`TbPhaseError::TaskFailures`]).
pub async fn run(args: &RunArgs, shutdown: CancellationToken) -> Result<(), TbPhaseError> {
    let loader = ConfigLoader::with_defaults();
    let spec = loader.load_topology(&args.topology)?;
    let config = match &args.config {
        Some(path) => loader.load_file(path)?.config,
        None => EngineConfig::default(),
    };
    config.apply()?;
    let options = config.engine_options()?;

    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        tracing::info!(port, "metrics endpoint listening");
    }
    let events = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let objections = Arc::new(Objections::new());
    let root = build_tree(&spec, &objections)?;
    tracing::info!(
        topology = %args.topology.display(),
        components = spec.count(),
        "component tree built"
    );

    let engine = PhaseEngine::new(root)
        .with_objections(objections as Arc<dyn ObjectionQuery>)
        .with_options(options)
        .with_events(Arc::new(events));

    let engine_token = engine.cancellation_token();
    let forward = tokio::spawn(async move {
        shutdown.cancelled().await;
        engine_token.cancel();
    });
    let result = engine.run_domain(&get_common_domain()).await;
    forward.abort();
    let summary = result?;

    match args.format {
        OutputFormat::Human => print!("{}", render_human(&summary)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    let failures = summary.task_failure_count();
    if failures > 0 {
        return Err(TbPhaseError::TaskFailures { count: failures });
    }
    Ok(())
}

/// Renders a run summary as an aligned text table.
#[must_use]
pub fn render_human(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {} (domain '{}')", summary.run_id, summary.domain);
    for report in &summary.phases {
        let _ = write!(
            out,
            "  {:<28} {:<8} {:>6}ms",
            report.phase,
            report.policy,
            report.duration.as_millis()
        );
        if report.tasks_spawned > 0 {
            let _ = write!(out, "  tasks={}", report.tasks_spawned);
        }
        if report.ready_to_end_iterations > 0 {
            let _ = write!(out, "  rte={}", report.ready_to_end_iterations);
        }
        if report.timed_out {
            out.push_str("  timed out");
        }
        if report.cancelled {
            out.push_str("  cancelled");
        }
        out.push('\n');
        for failure in &report.task_failures {
            let _ = writeln!(out, "    failed: {failure}");
        }
    }
    if summary.cancelled {
        out.push_str("run cancelled; remaining phases skipped\n");
    }
    out
}
