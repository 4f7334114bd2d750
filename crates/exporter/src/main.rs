//! Startup Exporter - central aggregation service
//!
//! Receives per-container startup records pushed by node collectors,
//! correlates them with pod and deployment membership from the cluster API,
//! and exposes two per-deployment latency gauges for Prometheus.

use anyhow::Result;
use meter_lib::{
    cluster::KubeClusterState, health::HealthRegistry, Engine, ExporterMetrics, ScoringLoop,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting startup-exporter");

    let config = config::ExporterConfig::load()?;

    let health = HealthRegistry::new();

    // Initialize metrics and the engine publishing through them
    let metrics = ExporterMetrics::new();
    let engine = Arc::new(Engine::new(Arc::new(metrics.clone())));

    // Reaching the cluster API is the one startup step allowed to be fatal
    let client = kube::Client::try_default().await?;
    let cluster = Arc::new(KubeClusterState::new(client));

    let (shutdown_tx, _) = broadcast::channel(1);

    let scoring = ScoringLoop::new(
        cluster,
        engine.clone(),
        metrics.clone(),
        health.clone(),
        Duration::from_secs(config.scoring_interval_secs),
    );
    let scoring_handle = tokio::spawn(scoring.run(shutdown_tx.subscribe()));

    let state = Arc::new(api::AppState::new(engine, health.clone(), metrics));

    // Mark exporter as ready after initialization
    health.set_ready(true).await;

    let server_shutdown = shutdown_tx.subscribe();
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!(error = %err, "failed to wait for shutdown signal"),
        }
        let _ = signal_tx.send(());
    });

    api::serve(config.listen_port, state, server_shutdown).await?;

    // Let the scoring loop finish its in-flight cycle
    let _ = scoring_handle.await;
    info!("Shutting down");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}
