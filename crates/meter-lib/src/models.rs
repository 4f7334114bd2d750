//! Core data models for the startup meter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace containerd files startup records under, distinct from any
/// Kubernetes namespace.
pub const RUNTIME_NAMESPACE: &str = "k8s.io";

/// Prefix the kubelet puts on containerd-managed container IDs.
pub const CONTAINERD_ID_PREFIX: &str = "containerd://";

const SHORT_ID_LEN: usize = 10;

/// Truncate a runtime container ID for log readability.
pub fn short_id(id: &str) -> &str {
    if id.len() > SHORT_ID_LEN {
        &id[..SHORT_ID_LEN]
    } else {
        id
    }
}

/// A (name, namespace) pair addressing either a startup record in the
/// runtime's identity space or a deployment in the orchestrator's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.namespace)
    }
}

/// Provenance tag for a startup record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Collectors that omit the tag send an empty string
    #[serde(alias = "")]
    #[default]
    Default,
    Checkpoint,
}

/// A container's startup timing as pushed by a node collector.
///
/// `name` is the runtime container ID and `namespace` the runtime namespace
/// the container was filed under. An `end` of 0 means the container has not
/// finished starting; collectors never push such records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupRecord {
    pub name: String,
    pub namespace: String,
    pub start: i64,
    pub end: i64,
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
}

impl StartupRecord {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.name, &self.namespace)
    }
}

/// A deployment as seen through the cluster-state collaborator.
///
/// `match_labels` is `None` when the deployment carries no usable selector,
/// which is a per-deployment configuration error.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// A live pod belonging to a deployment.
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    /// Number of containers declared in the pod spec, independent of how many
    /// have a runtime status yet.
    pub spec_containers: usize,
    pub statuses: Vec<RuntimeStatus>,
}

/// A container's live runtime status within a pod.
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub container: String,
    /// Raw orchestrator-reported ID, e.g. `containerd://<hex>`. Empty until
    /// the runtime has actually started the container.
    pub container_id: String,
}
