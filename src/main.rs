//! `tbphase`: hierarchical phase execution engine

use clap::Parser;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio_util::sync::CancellationToken;

use tbphase::cli::args::{Cli, OutputFormat, parse_exit_code};
use tbphase::cli::commands;
use tbphase::error::ExitCode;
use tbphase::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        }
    };

    if !cli.quiet {
        let format = match cli.log_format {
            OutputFormat::Human => LogFormat::Human,
            OutputFormat::Json => LogFormat::Json,
        };
        init_logging(format, cli.verbose, cli.color);
    }

    // First signal cancels the engine, second one exits
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm = signal(SignalKind::terminate()).ok();
            wait_for_signal(sigterm.as_mut()).await;

            eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
            shutdown.cancel();

            let code = wait_for_signal(sigterm.as_mut()).await;
            std::process::exit(code);
        });
    }

    let result = commands::dispatch(cli, shutdown).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Waits for SIGINT or SIGTERM and returns the matching exit code.
async fn wait_for_signal(sigterm: Option<&mut Signal>) -> i32 {
    let terminate = async {
        match sigterm {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
        () = terminate => ExitCode::TERMINATED,
    }
}
