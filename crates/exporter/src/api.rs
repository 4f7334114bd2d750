//! HTTP API for record ingestion, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use meter_lib::{
    health::{ComponentStatus, HealthRegistry},
    models::{short_id, StartupRecord},
    Engine, ExporterMetrics,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub health: HealthRegistry,
    pub metrics: ExporterMetrics,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, health: HealthRegistry, metrics: ExporterMetrics) -> Self {
        Self {
            engine,
            health,
            metrics,
        }
    }
}

/// Record ingestion. The first record per identity wins; duplicates are
/// accepted silently so collectors can re-push on every sweep.
async fn receive_record(
    State(state): State<Arc<AppState>>,
    Json(record): Json<StartupRecord>,
) -> StatusCode {
    if record.name.trim().is_empty() || record.namespace.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    if state.engine.insert_record(record.clone()) {
        state.metrics.inc_records_received();
        debug!(
            name = %short_id(&record.name),
            namespace = %record.namespace,
            start = record.start,
            end = record.end,
            "received a new container"
        );
    } else {
        state.metrics.inc_duplicate_records();
    }
    StatusCode::OK
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(receive_record))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server; drains gracefully when the shutdown channel fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting exporter API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
