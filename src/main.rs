//! Self-healing binary entry point.
//!
//! Reads newline-delimited `SystemIncident` JSON on stdin and writes one
//! `HealingOutcome` JSON line per incident on stdout once its recovery has
//! finished. Incidents are handled concurrently, so outcomes appear in
//! completion order. All logs go to stderr.
//!
//! Coverage is excluded because the main function only wires stdio to the
//! library.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use self_healing::config::HealingConfig;
use self_healing::error::AppError;
use self_healing::incident::{incident_schema, SystemIncident};
use self_healing::{HealingOutcome, RecoveryDecision, SelfHealingSystem};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--schema") {
        match serde_json::to_string_pretty(&incident_schema()) {
            Ok(schema) => println!("{schema}"),
            Err(e) => {
                eprintln!("Failed to render schema: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // Initialize logging to stderr only (stdout is for outcomes)
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("self-healing starting...");

    let config = match HealingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Configuration loaded: database={}, confidence_threshold={}, max_concurrent_recoveries={}",
        config.database_path.as_deref().unwrap_or("memory"),
        config.diagnosis.confidence_threshold,
        config.recovery.max_concurrent_recoveries
    );

    let system = match SelfHealingSystem::from_config(config).await {
        Ok(system) => system,
        Err(e) => {
            tracing::error!("Startup error: {e}");
            std::process::exit(1);
        }
    };

    let system = Arc::new(system);
    let handle = system.start();
    let (outcomes, rx) = mpsc::channel(OUTCOME_BUFFER);
    let writer = tokio::spawn(write_outcomes(rx));
    let mut in_flight = JoinSet::new();

    match run_stdio(&system, &mut in_flight, &outcomes).await {
        Ok(InputEnd::Eof) => {
            tokio::select! {
                () = drain(&mut in_flight) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, cancelling recoveries"),
            }
        }
        Ok(InputEnd::Interrupted) => {}
        Err(e) => tracing::error!("I/O error: {e}"),
    }
    handle.shutdown().await;
    drain(&mut in_flight).await;

    drop(outcomes);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Failed to write outcomes: {e}"),
        Err(e) => tracing::error!("Outcome writer ended abnormally: {e}"),
    }

    tracing::info!("self-healing shutdown complete");
}

/// Outcome lines buffered ahead of stdout.
const OUTCOME_BUFFER: usize = 64;

/// Why input processing stopped.
enum InputEnd {
    Eof,
    Interrupted,
}

/// Read stdin until EOF or Ctrl-C, handling each incident in its own task.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run_stdio(
    system: &Arc<SelfHealingSystem>,
    in_flight: &mut JoinSet<()>,
    outcomes: &mpsc::Sender<String>,
) -> std::io::Result<InputEnd> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
                continue;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                return Ok(InputEnd::Interrupted);
            }
        };
        let Some(line) = line else {
            tracing::info!(in_flight = in_flight.len(), "End of input, waiting for recoveries");
            return Ok(InputEnd::Eof);
        };
        if line.trim().is_empty() {
            continue;
        }

        let system = Arc::clone(system);
        let outcomes = outcomes.clone();
        in_flight.spawn(async move {
            match handle_line(&system, &line).await {
                Ok(outcome) => match serde_json::to_string(&outcome) {
                    Ok(json) => {
                        if outcomes.send(json).await.is_err() {
                            tracing::warn!(incident_id = %outcome.incident_id, "Outcome writer closed");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to serialize outcome"),
                },
                Err(e) => tracing::error!(error = %e, "Failed to handle incident"),
            }
        });
    }
}

/// Wait for every in-flight incident task.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Incident task ended abnormally");
    }
}

/// Write outcome lines to stdout in completion order.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn write_outcomes(mut rx: mpsc::Receiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(json) = rx.recv().await {
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
async fn handle_line(system: &SelfHealingSystem, line: &str) -> Result<HealingOutcome, AppError> {
    let incident: SystemIncident =
        serde_json::from_str(line).map_err(|e| AppError::InvalidIncident {
            message: e.to_string(),
        })?;

    let mut outcome = system.handle_incident(&incident).await?;
    if let RecoveryDecision::Started { operation } = &mut outcome.decision {
        if let Some(finished) = system
            .recovery_engine()
            .wait_for_completion(&operation.id)
            .await
        {
            *operation = finished;
        }
    }
    Ok(outcome)
}
