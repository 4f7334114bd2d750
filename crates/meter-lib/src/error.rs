//! Error types for the aggregation engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeterError {
    /// The orchestrator reports a container whose runtime ID does not carry
    /// the containerd prefix. The container is managed by some other runtime,
    /// so no metric for its deployment can be trusted this cycle.
    #[error(
        "container {container} ({container_id}) of pod {pod} in {namespace} is not run by containerd"
    )]
    UnmanagedContainer {
        container: String,
        container_id: String,
        pod: String,
        namespace: String,
    },
}
