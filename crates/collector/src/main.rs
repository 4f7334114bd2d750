//! Startup Collector - per-node collection agent
//!
//! Runs as a DaemonSet on each node, scraping container start/end timestamps
//! from containerd's on-disk task state and pushing them to the central
//! exporter. Duplicate pushes are cheap: the exporter keeps the first record
//! per container and ignores the rest.

use anyhow::Result;
use clap::Parser;
use meter_lib::{
    push::PushClient,
    scrape::{StartupScraper, DEFAULT_RUNTIME_ROOT},
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Collect container startup timings and push them to the exporter
#[derive(Parser)]
#[command(name = "startup-collector")]
#[command(author, version, about = "Collects container startup timings from containerd", long_about = None)]
struct Cli {
    /// Exporter endpoint to push records to, e.g. http://startup-exporter:9090/
    #[arg(env = "COLLECTOR_EXPORTER_URL")]
    exporter_url: String,

    /// Restrict collection to a single containerd namespace
    #[arg(long, short, env = "COLLECTOR_NAMESPACE")]
    namespace: Option<String>,

    /// containerd v2 task state directory to scrape
    #[arg(long, default_value = DEFAULT_RUNTIME_ROOT)]
    runtime_root: PathBuf,

    /// Seconds between collection sweeps
    #[arg(long, default_value_t = 1)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let scraper = StartupScraper::new(&cli.runtime_root);
    let client = PushClient::new(&cli.exporter_url)?;

    info!(exporter = %cli.exporter_url, "Starting startup-collector");

    let mut ticker = interval(Duration::from_secs(cli.interval_secs));
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&scraper, &client, cli.namespace.as_deref()).await;
            }
            _ = &mut shutdown => {
                info!("Received shutdown signal, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// One collection sweep: scrape, then push. Failures are logged and the
/// next sweep starts from scratch.
async fn sweep(scraper: &StartupScraper, client: &PushClient, namespace: Option<&str>) {
    let records = match namespace {
        Some(ns) => scraper.scan_namespace(ns).await,
        None => match scraper.scan_all().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to scan the runtime root");
                return;
            }
        },
    };

    if records.is_empty() {
        return;
    }
    debug!(count = records.len(), "pushing startup records");

    if let Err(err) = client.push(&records).await {
        error!(error = %err, "failed to push container startup records to the exporter");
    }
}

async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
