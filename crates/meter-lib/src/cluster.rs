//! Cluster-state access
//!
//! The scoring loop only needs two views of the cluster: the deployments and
//! the pods matching a deployment's selector. Both are behind a trait so the
//! loop can run against a stub in tests; the production implementation lists
//! through the Kubernetes API on every cycle, which bounds staleness by the
//! cycle interval.

use crate::models::{DeploymentInfo, PodInfo, RuntimeStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::{api::ListParams, Api, Client};
use std::collections::BTreeMap;

#[async_trait]
pub trait ClusterState: Send + Sync {
    /// All deployments in the cluster.
    async fn deployments(&self) -> Result<Vec<DeploymentInfo>>;

    /// Pods in `namespace` matching every given label exactly. An empty map
    /// matches all pods in the namespace.
    async fn pods(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>>;
}

/// Cluster state read live from the Kubernetes API.
pub struct KubeClusterState {
    client: Client,
}

impl KubeClusterState {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterState for KubeClusterState {
    async fn deployments(&self) -> Result<Vec<DeploymentInfo>> {
        let api: Api<Deployment> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("failed to list deployments in the cluster")?;
        Ok(list.items.into_iter().filter_map(deployment_info).collect())
    }

    async fn pods(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !match_labels.is_empty() {
            params = params.labels(&equality_selector(match_labels));
        }
        let list = api
            .list(&params)
            .await
            .with_context(|| format!("failed to list pods in {}", namespace))?;
        Ok(list.items.into_iter().filter_map(pod_info).collect())
    }
}

/// Label selector string from exact-match requirements only. Set-based
/// selector operators are not supported by this system.
fn equality_selector(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn deployment_info(deploy: Deployment) -> Option<DeploymentInfo> {
    let name = deploy.metadata.name?;
    let namespace = deploy.metadata.namespace?;
    // A deployment without a spec has no selector to resolve pods with;
    // surface that as a configuration error rather than matching everything.
    let match_labels = deploy
        .spec
        .map(|spec| spec.selector.match_labels.unwrap_or_default());
    Some(DeploymentInfo {
        name,
        namespace,
        match_labels,
    })
}

fn pod_info(pod: Pod) -> Option<PodInfo> {
    let name = pod.metadata.name?;
    let namespace = pod.metadata.namespace?;
    let spec_containers = pod
        .spec
        .map(|spec| spec.containers.len())
        .unwrap_or_default();
    let statuses = pod
        .status
        .and_then(|status| status.container_statuses)
        .unwrap_or_default()
        .into_iter()
        .map(|status| RuntimeStatus {
            container: status.name,
            container_id: status.container_id.unwrap_or_default(),
        })
        .collect();
    Some(PodInfo {
        name,
        namespace,
        spec_containers,
        statuses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, ContainerStatus, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

    #[test]
    fn test_equality_selector_joins_pairs() {
        let labels: BTreeMap<String, String> = [
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "frontend".to_string()),
        ]
        .into();
        assert_eq!(equality_selector(&labels), "app=web,tier=frontend");
    }

    #[test]
    fn test_deployment_without_spec_has_no_selector() {
        let deploy = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let info = deployment_info(deploy).unwrap();
        assert!(info.match_labels.is_none());
    }

    #[test]
    fn test_deployment_selector_labels_extracted() {
        let deploy = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some([("app".to_string(), "web".to_string())].into()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = deployment_info(deploy).unwrap();
        assert_eq!(
            info.match_labels.unwrap().get("app"),
            Some(&"web".to_string())
        );
    }

    #[test]
    fn test_pod_info_counts_spec_containers_and_maps_statuses() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-abc".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container::default(), Container::default()],
                ..Default::default()
            }),
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "app".to_string(),
                    container_id: Some("containerd://abc".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = pod_info(pod).unwrap();
        assert_eq!(info.spec_containers, 2);
        assert_eq!(info.statuses.len(), 1);
        assert_eq!(info.statuses[0].container_id, "containerd://abc");
    }

    #[test]
    fn test_pod_without_status_maps_to_no_statuses() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-abc".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let info = pod_info(pod).unwrap();
        assert_eq!(info.spec_containers, 0);
        assert!(info.statuses.is_empty());
    }
}
