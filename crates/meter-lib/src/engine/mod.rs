//! Aggregation and gating engine
//!
//! Owns the two pieces of cross-cycle state: the record store (runtime
//! container ID -> startup record, write-once) and the per-deployment memory
//! of the last successfully scored pod set. Both sit behind one mutex because
//! scoring reads across them under a single logical snapshot while the
//! ingestion endpoint inserts concurrently.


use crate::error::MeterError;
use crate::models::{short_id, ObjectKey, PodInfo, StartupRecord, CONTAINERD_ID_PREFIX, RUNTIME_NAMESPACE};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Receives gauge writes for a fully scored deployment.
///
/// Values are last-write-wins per deployment key, never incremented.
pub trait MetricSink: Send + Sync {
    fn record_average_latency(&self, deploy: &ObjectKey, value: f64);
    fn record_scale_latency(&self, deploy: &ObjectKey, value: f64);
}

#[derive(Default)]
struct EngineState {
    /// Startup records keyed under the runtime namespace. First write wins;
    /// entries are never removed for the life of the process.
    records: HashMap<ObjectKey, StartupRecord>,
    /// Pod-name sets from the last successful scoring, per deployment.
    scored: HashMap<ObjectKey, HashSet<String>>,
}

/// The aggregation engine shared between the ingestion endpoint and the
/// scoring loop.
pub struct Engine {
    state: Mutex<EngineState>,
    sink: Arc<dyn MetricSink>,
}

impl Engine {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            sink,
        }
    }

    /// Insert a pushed record unless one already exists for its identity.
    /// Returns whether the record was newly inserted; duplicates are not an
    /// error and leave the stored record untouched.
    pub fn insert_record(&self, record: StartupRecord) -> bool {
        let key = record.key();
        let mut state = self.lock();
        if state.records.contains_key(&key) {
            return false;
        }
        state.records.insert(key, record);
        true
    }

    /// Exact-match lookup of a stored record.
    pub fn record(&self, key: &ObjectKey) -> Option<StartupRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Pod-name set from the last successful scoring of a deployment.
    pub fn last_pod_set(&self, deploy: &ObjectKey) -> Option<HashSet<String>> {
        self.lock().scored.get(deploy).cloned()
    }

    /// Remember the pod set a deployment was just successfully scored with.
    pub fn commit_pod_set(&self, deploy: &ObjectKey, pods: HashSet<String>) {
        self.lock().scored.insert(deploy.clone(), pods);
    }

    /// Decide whether a deployment's current pod set is worth (re)scoring.
    ///
    /// A pod with no container statuses, or with any blank runtime ID, means
    /// the orchestrator's view of it has not settled yet; that check must
    /// short-circuit before any set comparison.
    pub fn should_score(&self, deploy: &ObjectKey, live_pods: &[PodInfo]) -> bool {
        if live_pods.is_empty() {
            return false;
        }
        let mut current = HashSet::with_capacity(live_pods.len());
        for pod in live_pods {
            if pod.statuses.is_empty() {
                return false;
            }
            for status in &pod.statuses {
                if status.container_id.trim().is_empty() {
                    // at least one container is not running yet
                    return false;
                }
            }
            current.insert(pod.name.clone());
        }
        match self.last_pod_set(deploy) {
            None => true,
            Some(last) => last != current,
        }
    }

    /// Compute and publish a deployment's metrics from its live pod set.
    ///
    /// Returns `Ok(true)` when both gaugeable values were derived from a
    /// fully received pod set, in which case the caller commits the pod set.
    /// `Ok(false)` means data is still missing; try again next cycle. An
    /// unmanaged container aborts the whole attempt with no metric writes.
    pub fn score(&self, deploy: &ObjectKey, live_pods: &[PodInfo]) -> Result<bool, MeterError> {
        let last = self.last_pod_set(deploy).unwrap_or_default();

        let mut target = 0usize;
        let mut total = 0f64;
        let mut window_start = i64::MAX;
        let mut window_end = 0i64;
        let mut unreceived: Vec<String> = Vec::new();

        for pod in live_pods {
            target += pod.spec_containers;
            let old_pod = last.contains(&pod.name);
            for status in &pod.statuses {
                let id = status
                    .container_id
                    .strip_prefix(CONTAINERD_ID_PREFIX)
                    .ok_or_else(|| MeterError::UnmanagedContainer {
                        container: status.container.clone(),
                        container_id: status.container_id.clone(),
                        pod: pod.name.clone(),
                        namespace: pod.namespace.clone(),
                    })?;
                let key = ObjectKey::new(id, RUNTIME_NAMESPACE);
                // Per-identity locking; record counts per deployment are
                // small enough that lock churn does not matter.
                match self.record(&key) {
                    Some(record) => {
                        if !old_pod {
                            window_start = window_start.min(record.start);
                            window_end = window_end.max(record.end);
                        }
                        total += (record.end - record.start) as f64;
                    }
                    None => unreceived.push(short_id(id).to_string()),
                }
            }
        }

        let received = target - unreceived.len();
        debug!(
            deployment = %deploy,
            target,
            received,
            missing = ?unreceived,
            "aggregated container records"
        );
        if received == 0 {
            // no data at all yet
            return Ok(false);
        }
        if received != target {
            // partial data; metrics are only published for a fully received set
            return Ok(false);
        }

        let avg = total / received as f64;
        debug!(deployment = %deploy, average = avg, "updating average startup latency");
        self.sink.record_average_latency(deploy, avg);
        if window_end > window_start {
            // only new pods move the window; an all-old-pod rescore leaves
            // the scale gauge untouched
            let scale = window_end - window_start;
            debug!(deployment = %deploy, scale_latency = scale, "updating scale latency");
            self.sink.record_scale_latency(deploy, scale as f64);
        }
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        // A poisoned lock means a panic mid-insert or mid-score; the maps
        // themselves are still structurally sound, so keep serving.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
