//! Health tracking behind the exporter's liveness and readiness probes
//!
//! Only two things can go wrong while the process is up: the scoring loop
//! can stop, and the cluster API can become unreachable. Each is a tracked
//! component; the probes report the worst of the two.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst so the overall
/// status is the maximum across components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

/// Health of a single component plus the operator-facing reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_change_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_change_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// The exporter's tracked components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The periodic scoring loop
    Scheduler,
    /// Deployment and pod listing through the cluster API
    Cluster,
}

/// Snapshot of every tracked component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSet {
    pub scheduler: ComponentHealth,
    pub cluster: ComponentHealth,
}

impl ComponentSet {
    fn overall(&self) -> ComponentStatus {
        self.scheduler.status.max(self.cluster.status)
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: ComponentSet,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

struct RegistryState {
    ready: bool,
    components: ComponentSet,
}

/// Tracks component health for the probe endpoints
#[derive(Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// New registry: every component healthy, readiness not yet signalled
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                ready: false,
                components: ComponentSet {
                    scheduler: ComponentHealth::healthy(),
                    cluster: ComponentHealth::healthy(),
                },
            })),
        }
    }

    /// Replace a component's health
    pub async fn update(&self, component: Component, health: ComponentHealth) {
        let mut state = self.state.write().await;
        match component {
            Component::Scheduler => state.components.scheduler = health,
            Component::Cluster => state.components.cluster = health,
        }
    }

    /// Mark component as healthy
    pub async fn set_healthy(&self, component: Component) {
        self.update(component, ComponentHealth::healthy()).await;
    }

    /// Mark component as degraded
    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::degraded(message)).await;
    }

    /// Mark component as unhealthy
    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::unhealthy(message)).await;
    }

    /// Signal that startup has finished
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.components.overall(),
            components: state.components.clone(),
        }
    }

    /// Get readiness response: ready once startup has finished and while no
    /// component has failed outright
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("exporter still starting".to_string()),
            };
        }
        if state.components.overall() == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("component has failed".to_string()),
            };
        }
        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_orders_worst_last() {
        assert!(ComponentStatus::Healthy < ComponentStatus::Degraded);
        assert!(ComponentStatus::Degraded < ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_initial_state_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_degraded_component_degrades_overall_but_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_degraded(Component::Cluster, "listing failed")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_flips_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_unhealthy(Component::Scheduler, "scoring loop stopped")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_recovery_restores_overall_status() {
        let registry = HealthRegistry::new();
        registry
            .set_unhealthy(Component::Cluster, "api unreachable")
            .await;
        registry.set_healthy(Component::Cluster).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.cluster.message.is_none());
    }
}
