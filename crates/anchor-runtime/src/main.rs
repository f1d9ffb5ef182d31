//! # Telemetry Anchor
//!
//! Watches the document store for new location events, hashes the telemetry
//! recorded in each transit window and anchors the digest on the ledger.
//!
//! ## Commands
//!
//! - `run` (default): dispatch pipeline runs from the change feed until
//!   SIGINT/SIGTERM
//! - `ingest <file>`: append NDJSON event records to the document store
//! - `verify --item <id>`: recompute and compare every recorded digest
//! - `reanchor`: resubmit digests the ledger never accepted
//!
//! The document store is single-process: `ingest`, `verify` and `reanchor`
//! run while the daemon is stopped. Ingested events are dispatched on the
//! next `run`.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anchor_pipeline::Verification;
use anchor_runtime::{AnchorConfig, AnchorContainer};
use anchor_telemetry::{init_telemetry, MetricsHandle};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use shared_types::time::Timestamp;
use shared_types::EventRecord;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "anchor-runtime", version, about = "Anchor transit telemetry digests on a ledger")]
struct Cli {
    /// Config file (default: ./anchor.toml if present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch pipeline runs from the change feed
    Run,
    /// Append event records from an NDJSON file
    Ingest {
        /// One event record per line
        file: PathBuf,
    },
    /// Verify the recorded digests of an item
    Verify {
        #[arg(long)]
        item: String,
    },
    /// Resubmit digests the ledger has not accepted yet
    Reanchor,
}

/// One NDJSON line. `event_id` is generated when absent.
#[derive(Deserialize)]
struct IngestLine {
    event_id: Option<String>,
    item_id: String,
    location_id: String,
    event_time: Timestamp,
}

fn load_config(path: Option<&PathBuf>) -> Result<AnchorConfig> {
    let (path, required) = match path {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(AnchorConfig::DEFAULT_PATH), false),
    };
    let config = AnchorConfig::load(&path, required)?.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn run(container: AnchorContainer, metrics: &MetricsHandle, config: &AnchorConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = container.dispatcher();
    let mut dispatch = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    info!("anchor runtime is running. Press Ctrl+C to stop.");

    let summary = tokio::select! {
        result = &mut dispatch => result,
        _ = shutdown_signal() => {
            info!("shutting down");
            let _ = shutdown_tx.send(true);
            dispatch.await
        }
    }
    .context("dispatcher task failed")??;

    info!(
        dispatched = summary.dispatched,
        completed = summary.completed,
        failed = summary.failed,
        abandoned = summary.abandoned,
        "shutdown complete"
    );

    if let Some(path) = &config.telemetry.metrics_file {
        let text = metrics.encode()?;
        std::fs::write(path, text).with_context(|| format!("failed to write metrics to {path}"))?;
    }
    Ok(())
}

fn ingest(container: &AnchorContainer, file: &Path) -> Result<()> {
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );

    let mut appended = 0usize;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IngestLine = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event record", file.display(), number + 1))?;
        let record = EventRecord {
            event_id: parsed
                .event_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            item_id: parsed.item_id,
            location_id: parsed.location_id,
            event_time: parsed.event_time,
        };
        let token = container.documents.append_event(&record)?;
        tracing::debug!(token = %token, event_id = %record.event_id, "event appended");
        appended += 1;
    }

    info!(appended, "ingest complete");
    Ok(())
}

async fn verify(container: &AnchorContainer, item: &str) -> Result<()> {
    let api = container.api();
    let trail = api.audit_trail(item).await?;
    if trail.is_empty() {
        bail!("no audit records for item {item}");
    }

    let mut tampered = 0usize;
    for record in &trail {
        let window = format!(
            "{} → {} ({} .. {})",
            record.window.prev_location,
            record.window.present_location,
            record.window.from_time_str(),
            record.window.to_time_str()
        );
        match api.verify(record).await? {
            Verification::Intact { readings } => {
                println!("intact    {} {window} readings={readings}", record.digest)
            }
            Verification::Tampered { expected, actual } => {
                tampered += 1;
                println!("tampered  {expected} {window} now={actual}");
            }
            Verification::Missing => {
                tampered += 1;
                println!("missing   {} {window}", record.digest);
            }
        }
    }

    if tampered > 0 {
        bail!("{tampered} of {} windows failed verification", trail.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let metrics = init_telemetry(&config.telemetry)?;

    let container = AnchorContainer::open(&config).context("failed to start runtime")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(container, &metrics, &config).await,
        Command::Ingest { file } => ingest(&container, &file),
        Command::Verify { item } => verify(&container, &item).await,
        Command::Reanchor => {
            let summary = container.api().reanchor_pending().await?;
            if summary.still_pending() > 0 {
                warn!(still_pending = summary.still_pending(), "some digests remain unanchored");
            }
            println!(
                "pending={} anchored={} still_pending={}",
                summary.pending,
                summary.anchored,
                summary.still_pending()
            );
            Ok(())
        }
    }
}
