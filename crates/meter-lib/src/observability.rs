//! Prometheus metrics for the exporter
//!
//! The two deployment gauges are the system's actual output; the counters are
//! operational bookkeeping for the ingestion path and the scoring loop.

use crate::engine::MetricSink;
use crate::models::ObjectKey;
use prometheus::{register_gauge_vec, register_int_counter, GaugeVec, IntCounter};
use std::sync::OnceLock;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct MetricsInner {
    average_startup_latency: GaugeVec,
    scale_latency: GaugeVec,
    records_received: IntCounter,
    duplicate_records: IntCounter,
    scoring_errors: IntCounter,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            average_startup_latency: register_gauge_vec!(
                "startup_exporter_pod_average_startup_latency_milliseconds",
                "Average container startup latency across a deployment's pods",
                &["deploy_name", "namespace"]
            )
            .expect("Failed to register average_startup_latency"),

            scale_latency: register_gauge_vec!(
                "startup_exporter_deployment_scale_latency_milliseconds",
                "Time from the first container start to the last container finish among newly scaled pods",
                &["deploy_name", "namespace"]
            )
            .expect("Failed to register scale_latency"),

            records_received: register_int_counter!(
                "startup_exporter_records_received_total",
                "Startup records accepted from node collectors"
            )
            .expect("Failed to register records_received"),

            duplicate_records: register_int_counter!(
                "startup_exporter_duplicate_records_total",
                "Pushed records ignored because their identity was already stored"
            )
            .expect("Failed to register duplicate_records"),

            scoring_errors: register_int_counter!(
                "startup_exporter_scoring_errors_total",
                "Deployment scoring attempts abandoned with an error"
            )
            .expect("Failed to register scoring_errors"),
        }
    }
}

/// Exporter metrics handle
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Replace a deployment's average startup latency gauge
    pub fn set_average_startup_latency(&self, deploy: &ObjectKey, value: f64) {
        self.inner()
            .average_startup_latency
            .with_label_values(&[&deploy.name, &deploy.namespace])
            .set(value);
    }

    /// Replace a deployment's scale latency gauge
    pub fn set_scale_latency(&self, deploy: &ObjectKey, value: f64) {
        self.inner()
            .scale_latency
            .with_label_values(&[&deploy.name, &deploy.namespace])
            .set(value);
    }

    /// Count an accepted startup record
    pub fn inc_records_received(&self) {
        self.inner().records_received.inc();
    }

    /// Count an ignored duplicate record
    pub fn inc_duplicate_records(&self) {
        self.inner().duplicate_records.inc();
    }

    /// Count an abandoned scoring attempt
    pub fn inc_scoring_errors(&self) {
        self.inner().scoring_errors.inc();
    }
}

impl MetricSink for ExporterMetrics {
    fn record_average_latency(&self, deploy: &ObjectKey, value: f64) {
        self.set_average_startup_latency(deploy, value);
    }

    fn record_scale_latency(&self, deploy: &ObjectKey, value: f64) {
        self.set_scale_latency(deploy, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_metrics_gauges_appear_in_gather() {
        let metrics = ExporterMetrics::new();
        let deploy = ObjectKey::new("web", "default");

        metrics.set_average_startup_latency(&deploy, 55.0);
        metrics.set_scale_latency(&deploy, 200.0);
        metrics.inc_records_received();
        metrics.inc_duplicate_records();
        metrics.inc_scoring_errors();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names
            .iter()
            .any(|n| n == "startup_exporter_pod_average_startup_latency_milliseconds"));
        assert!(names
            .iter()
            .any(|n| n == "startup_exporter_deployment_scale_latency_milliseconds"));
    }
}
