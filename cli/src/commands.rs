//! Implementations of the four command-line tools.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};

use parcelflow_core::pipeline::{extract_package_events, SortingCenterWorker, WorkerOptions};
use parcelflow_core::{admin, Center, Config, EventImporter, Simulator, SimulatorConfig, TroubleReporter};

use crate::bootstrap::Backends;

/// Generate scan events and write them to stdout, one per line.
pub fn simulate(config: SimulatorConfig, json_output: bool) -> Result<()> {
    let mut simulator = Simulator::new(config)?;
    let events = simulator.events();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in &events {
        if json_output {
            let line = serde_json::to_string(event)?;
            writeln!(out, "{line}")?;
        } else {
            writeln!(out, "{event:?}")?;
        }
    }
    Ok(())
}

/// Optionally purge shared state, then fan an event file into the per-center
/// input streams.
pub async fn import(
    backends: &Backends,
    scope: &str,
    import_file: &str,
    purge_scope: bool,
    purge_coordination: bool,
) -> Result<u64> {
    if purge_scope {
        admin::purge_streams(backends.bus.as_ref(), scope).await?;
        admin::purge_tables(backends.kv.as_ref(), scope).await?;
    }
    if purge_coordination {
        admin::purge_coordination(backends.coord.as_ref()).await?;
    }

    let importer = EventImporter::new(backends.bus.clone(), scope);
    if import_file == "-" {
        let stdin = io::stdin();
        importer.import(stdin.lock()).await
    } else {
        let file = File::open(import_file)
            .with_context(|| format!("failed to open import file {import_file}"))?;
        importer.import(BufReader::new(file)).await
    }
}

/// Run one center's pipeline worker to completion.
pub async fn run_sorting_center(
    backends: &Backends,
    config: &Config,
    options: WorkerOptions,
) -> Result<u64> {
    let worker = SortingCenterWorker::new(
        options,
        backends.bus.clone(),
        backends.kv.clone(),
        backends.coord.clone(),
        config.pipeline.clone(),
    );
    let processed = worker.run().await?;
    tracing::info!("processed {} events", processed);
    Ok(processed)
}

/// Print every event for one package at one center.
pub async fn extract_package(
    backends: &Backends,
    config: &Config,
    scope: &str,
    center: Center,
    package_id: &str,
) -> Result<()> {
    let events = extract_package_events(
        backends.bus.as_ref(),
        scope,
        center,
        package_id,
        config.pipeline.read_timeout(),
    )
    .await?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in &events {
        writeln!(out, "{event:?}")?;
    }
    Ok(())
}

/// Tail the trouble stream and log a report line per event.
pub async fn run_trouble_reporter(
    backends: &Backends,
    config: &Config,
    scope: &str,
    wait_for_events: bool,
) -> Result<()> {
    let reporter = TroubleReporter::new(
        backends.bus.clone(),
        backends.kv.clone(),
        scope,
        config.pipeline.read_timeout(),
    );
    reporter.run(wait_for_events).await?;
    Ok(())
}
