//! The cluster capability seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use slipway_spec::{Deployment, Pod, Service};

use crate::error::ClusterResult;
use crate::pod::PodState;

/// Followed container output. Dropping the stream closes it.
pub type LogStream = BoxStream<'static, ClusterResult<Bytes>>;

/// Outcome of a create-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
}

/// Narrow Kubernetes capability set used by the orchestrator.
///
/// Implementations must not retry; resilience belongs to the caller.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create the namespace if it does not exist yet.
    async fn ensure_namespace(&self, name: &str) -> ClusterResult<()>;

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()>;

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodState>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<PodState>>;

    /// Follow a pod's log output from the start.
    async fn pod_logs(&self, namespace: &str, name: &str) -> ClusterResult<LogStream>;

    /// The last `lines` lines a pod has written so far, or all of them.
    async fn pod_log_tail(
        &self,
        namespace: &str,
        name: &str,
        lines: Option<i64>,
    ) -> ClusterResult<String>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    async fn get_deployment(&self, namespace: &str, name: &str)
    -> ClusterResult<Option<Deployment>>;

    async fn apply_deployment(&self, deployment: &Deployment) -> ClusterResult<Applied>;

    async fn apply_service(&self, service: &Service) -> ClusterResult<Applied>;
}

/// Render a label map as an equality selector (`k1=v1,k2=v2`).
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
