//! Scoring loop
//!
//! Drives the gate and aggregator over all deployments on a fixed interval.
//! No error inside a cycle is fatal: listing failures and per-deployment
//! scoring failures are logged and retried on the next tick.

use crate::cluster::ClusterState;
use crate::engine::Engine;
use crate::health::{Component, HealthRegistry};
use crate::models::{DeploymentInfo, ObjectKey};
use crate::observability::ExporterMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Default time between scoring cycles
pub const DEFAULT_SCORING_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive deployment-listing failures before the cluster component is
/// reported as failed rather than degraded
const LIST_FAILURE_UNHEALTHY_STREAK: u32 = 3;

/// Periodic driver for the aggregation engine
pub struct ScoringLoop {
    cluster: Arc<dyn ClusterState>,
    engine: Arc<Engine>,
    metrics: ExporterMetrics,
    health: HealthRegistry,
    interval: Duration,
    /// Current streak of failed deployment listings
    list_failures: u32,
}

impl ScoringLoop {
    pub fn new(
        cluster: Arc<dyn ClusterState>,
        engine: Arc<Engine>,
        metrics: ExporterMetrics,
        health: HealthRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            cluster,
            engine,
            metrics,
            health,
            interval,
            list_failures: 0,
        }
    }

    /// Run until the shutdown channel fires. A cycle in flight when the
    /// signal arrives always runs to completion.
    pub async fn run(mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scoring loop"
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scoring loop");
                    break;
                }
            }
        }

        // A stopped loop means stale gauges; flip readiness until restart.
        self.health
            .set_unhealthy(Component::Scheduler, "scoring loop stopped")
            .await;
    }

    /// One pass over every deployment in the cluster.
    async fn cycle(&mut self) {
        let deployments = match self.cluster.deployments().await {
            Ok(deployments) => {
                self.list_failures = 0;
                self.health.set_healthy(Component::Cluster).await;
                deployments
            }
            Err(err) => {
                self.list_failures += 1;
                error!(
                    error = %err,
                    failures = self.list_failures,
                    "failed to list deployments in the cluster"
                );
                if self.list_failures >= LIST_FAILURE_UNHEALTHY_STREAK {
                    self.health
                        .set_unhealthy(Component::Cluster, err.to_string())
                        .await;
                } else {
                    self.health
                        .set_degraded(Component::Cluster, err.to_string())
                        .await;
                }
                return;
            }
        };

        for deploy in deployments {
            self.visit(deploy).await;
        }
    }

    /// Gate, score, and commit a single deployment. Failures here never
    /// affect the other deployments in the cycle.
    async fn visit(&self, deploy: DeploymentInfo) {
        let key = ObjectKey::new(&deploy.name, &deploy.namespace);

        let Some(match_labels) = deploy.match_labels else {
            error!(deployment = %key, "deployment has an empty selector");
            return;
        };

        let pods = match self.cluster.pods(&deploy.namespace, &match_labels).await {
            Ok(pods) => pods,
            Err(err) => {
                error!(deployment = %key, error = %err, "failed to list pods belonging to deployment");
                return;
            }
        };

        if !self.engine.should_score(&key, &pods) {
            return;
        }
        debug!(deployment = %key, "pod set changed, rescoring");

        match self.engine.score(&key, &pods) {
            Ok(true) => {
                debug!(deployment = %key, "deployment scored successfully");
                let names = pods.into_iter().map(|pod| pod.name).collect();
                self.engine.commit_pod_set(&key, names);
            }
            Ok(false) => {}
            Err(err) => {
                error!(deployment = %key, error = %err, "abandoned scoring attempt");
                self.metrics.inc_scoring_errors();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MetricSink;
    use crate::health::ComponentStatus;
    use crate::models::{PodInfo, RecordKind, RuntimeStatus, StartupRecord, RUNTIME_NAMESPACE};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        averages: Mutex<Vec<(ObjectKey, f64)>>,
        scales: Mutex<Vec<(ObjectKey, f64)>>,
    }

    impl MetricSink for RecordingSink {
        fn record_average_latency(&self, deploy: &ObjectKey, value: f64) {
            self.averages.lock().unwrap().push((deploy.clone(), value));
        }

        fn record_scale_latency(&self, deploy: &ObjectKey, value: f64) {
            self.scales.lock().unwrap().push((deploy.clone(), value));
        }
    }

    /// Fixed cluster view, optionally failing either listing call
    #[derive(Default)]
    struct StubCluster {
        deployments: Vec<DeploymentInfo>,
        pods: Vec<PodInfo>,
        fail_deployments: bool,
        fail_pods: bool,
    }

    #[async_trait]
    impl ClusterState for StubCluster {
        async fn deployments(&self) -> anyhow::Result<Vec<DeploymentInfo>> {
            if self.fail_deployments {
                return Err(anyhow!("api unavailable"));
            }
            Ok(self.deployments.clone())
        }

        async fn pods(
            &self,
            _namespace: &str,
            _match_labels: &BTreeMap<String, String>,
        ) -> anyhow::Result<Vec<PodInfo>> {
            if self.fail_pods {
                return Err(anyhow!("api unavailable"));
            }
            Ok(self.pods.clone())
        }
    }

    fn web_deployment() -> DeploymentInfo {
        DeploymentInfo {
            name: "web".to_string(),
            namespace: "default".to_string(),
            match_labels: Some([("app".to_string(), "web".to_string())].into()),
        }
    }

    fn pod(name: &str, id: &str) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: "default".to_string(),
            spec_containers: 1,
            statuses: vec![RuntimeStatus {
                container: "app".to_string(),
                container_id: format!("containerd://{}", id),
            }],
        }
    }

    fn record(id: &str, start: i64, end: i64) -> StartupRecord {
        StartupRecord {
            name: id.to_string(),
            namespace: RUNTIME_NAMESPACE.to_string(),
            start,
            end,
            kind: RecordKind::Default,
        }
    }

    fn scoring_loop(
        cluster: StubCluster,
    ) -> (ScoringLoop, Arc<Engine>, Arc<RecordingSink>, HealthRegistry) {
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(Engine::new(sink.clone()));
        let health = HealthRegistry::new();
        let scoring = ScoringLoop::new(
            Arc::new(cluster),
            engine.clone(),
            ExporterMetrics::new(),
            health.clone(),
            DEFAULT_SCORING_INTERVAL,
        );
        (scoring, engine, sink, health)
    }

    #[tokio::test]
    async fn test_cycle_scores_and_commits_pod_set() {
        let cluster = StubCluster {
            deployments: vec![web_deployment()],
            pods: vec![pod("p1", "abc"), pod("p2", "def")],
            ..Default::default()
        };
        let (mut scoring, engine, sink, _health) = scoring_loop(cluster);
        engine.insert_record(record("abc", 100, 150));
        engine.insert_record(record("def", 200, 260));

        scoring.cycle().await;

        let key = ObjectKey::new("web", "default");
        let tracked = engine.last_pod_set(&key).unwrap();
        assert!(tracked.contains("p1") && tracked.contains("p2"));
        assert_eq!(sink.averages.lock().unwrap().len(), 1);

        // unchanged pod set: the second cycle is a no-op
        scoring.cycle().await;
        assert_eq!(sink.averages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_skips_selectorless_deployment() {
        let cluster = StubCluster {
            deployments: vec![DeploymentInfo {
                name: "broken".to_string(),
                namespace: "default".to_string(),
                match_labels: None,
            }],
            pods: vec![pod("p1", "abc")],
            ..Default::default()
        };
        let (mut scoring, engine, sink, _health) = scoring_loop(cluster);
        engine.insert_record(record("abc", 100, 150));

        scoring.cycle().await;

        assert!(engine
            .last_pod_set(&ObjectKey::new("broken", "default"))
            .is_none());
        assert!(sink.averages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_degrades_then_fails_cluster_component() {
        let cluster = StubCluster {
            fail_deployments: true,
            ..Default::default()
        };
        let (mut scoring, _engine, _sink, health) = scoring_loop(cluster);
        health.set_ready(true).await;

        scoring.cycle().await;
        let status = health.health().await;
        assert_eq!(status.components.cluster.status, ComponentStatus::Degraded);
        assert!(health.readiness().await.ready);

        scoring.cycle().await;
        scoring.cycle().await;
        let status = health.health().await;
        assert_eq!(status.components.cluster.status, ComponentStatus::Unhealthy);
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_successful_listing_resets_failure_streak() {
        let cluster = StubCluster {
            fail_deployments: true,
            ..Default::default()
        };
        let (mut scoring, _engine, _sink, health) = scoring_loop(cluster);

        scoring.cycle().await;
        scoring.cycle().await;

        // the API comes back before the streak reaches the threshold
        scoring.cluster = Arc::new(StubCluster::default());
        scoring.cycle().await;

        let status = health.health().await;
        assert_eq!(status.components.cluster.status, ComponentStatus::Healthy);
        assert_eq!(scoring.list_failures, 0);
    }

    #[tokio::test]
    async fn test_cycle_survives_pod_listing_failure() {
        let cluster = StubCluster {
            deployments: vec![web_deployment()],
            fail_pods: true,
            ..Default::default()
        };
        let (mut scoring, engine, _sink, _health) = scoring_loop(cluster);

        scoring.cycle().await;

        assert!(engine
            .last_pod_set(&ObjectKey::new("web", "default"))
            .is_none());
    }

    #[tokio::test]
    async fn test_partial_data_leaves_pod_set_uncommitted() {
        let cluster = StubCluster {
            deployments: vec![web_deployment()],
            pods: vec![pod("p1", "abc"), pod("p2", "def")],
            ..Default::default()
        };
        let (mut scoring, engine, sink, _health) = scoring_loop(cluster);
        engine.insert_record(record("abc", 100, 150));

        scoring.cycle().await;

        assert!(engine
            .last_pod_set(&ObjectKey::new("web", "default"))
            .is_none());
        assert!(sink.averages.lock().unwrap().is_empty());

        // the missing record arrives; the next cycle publishes
        engine.insert_record(record("def", 200, 260));
        scoring.cycle().await;
        assert_eq!(sink.averages.lock().unwrap().len(), 1);
    }
}
