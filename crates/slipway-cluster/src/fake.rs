//! In-memory [`ClusterClient`] with scripted build pods.
//!
//! Every created pod follows the current [`BuildScript`]: each `list_pods`
//! call that returns the pod advances it one phase, terminal phases report
//! the scripted exit code, and `pod_logs` yields the scripted lines.
//!
//! Applying a Deployment replaces its runtime pods with `replicas` running
//! ones that print the configured runtime log lines.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use slipway_spec::{Deployment, ObjectMeta, Pod, Service};
use tracing::debug;

use crate::client::{Applied, ClusterClient, LogStream};
use crate::error::{ClusterError, ClusterResult};
use crate::pod::{ContainerExit, PodPhase, PodState};

/// The API server's limit on label values.
const MAX_LABEL_VALUE_LEN: usize = 63;

/// How a fake build pod behaves.
#[derive(Debug, Clone)]
pub struct BuildScript {
    /// Phases reported on successive lists; the last one sticks.
    pub phases: Vec<PodPhase>,
    pub exit_code: i32,
    pub log_lines: Vec<String>,
    /// Keep the log stream open after the scripted lines, as a followed log
    /// of a pod that never terminates would.
    pub logs_stay_open: bool,
    pub message: Option<String>,
}

impl BuildScript {
    pub fn phases(phases: &[PodPhase]) -> Self {
        Self {
            phases: phases.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_open_logs(mut self) -> Self {
        self.logs_stay_open = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for BuildScript {
    fn default() -> Self {
        Self {
            phases: vec![PodPhase::Pending, PodPhase::Running, PodPhase::Succeeded],
            exit_code: 0,
            log_lines: vec![
                "-----> Fetching source".to_string(),
                "-----> Compiling".to_string(),
                "-----> Slug compiled".to_string(),
            ],
            logs_stay_open: false,
            message: None,
        }
    }
}

/// Per-operation call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub ensure_namespace: u32,
    pub create_pod: u32,
    pub get_pod: u32,
    pub list_pods: u32,
    pub pod_logs: u32,
    pub delete_pod: u32,
    pub apply_deployment: u32,
    pub apply_service: u32,
}

struct FakePod {
    manifest: Pod,
    pending: VecDeque<PodPhase>,
    phase: PodPhase,
    script: BuildScript,
}

impl FakePod {
    fn state(&self) -> PodState {
        let container = self
            .manifest
            .spec
            .containers
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let exits = if self.phase.is_terminal() {
            vec![ContainerExit {
                container,
                exit_code: self.script.exit_code,
                reason: Some(
                    if self.script.exit_code == 0 { "Completed" } else { "Error" }.to_string(),
                ),
            }]
        } else {
            Vec::new()
        };
        PodState {
            name: self.manifest.metadata.name.clone(),
            namespace: self.manifest.metadata.namespace.clone(),
            labels: self.manifest.metadata.labels.clone(),
            phase: self.phase,
            message: self.script.message.clone(),
            exits,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.pending.pop_front() {
            self.phase = next;
        }
    }
}

#[derive(Default)]
struct Inner {
    namespaces: BTreeSet<String>,
    pods: BTreeMap<(String, String), FakePod>,
    /// Running pods per Deployment.
    runtime_pods: BTreeMap<(String, String), Vec<FakePod>>,
    runtime_logs: Vec<String>,
    deployments: BTreeMap<(String, String), Deployment>,
    services: BTreeMap<(String, String), Service>,
    script: BuildScript,
    calls: CallCounts,
    hidden_lists: u32,
    reject_pods: bool,
    reject_logs: bool,
    fail_lists: bool,
}

/// In-memory cluster for tests and local dry runs.
#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script applied to pods created from now on.
    pub fn with_script(self, script: BuildScript) -> Self {
        self.lock().script = script;
        self
    }

    /// Make the next `n` list calls return no pods.
    pub fn with_hidden_lists(self, n: u32) -> Self {
        self.lock().hidden_lists = n;
        self
    }

    pub fn reject_pods(self, reject: bool) -> Self {
        self.lock().reject_pods = reject;
        self
    }

    pub fn reject_logs(self, reject: bool) -> Self {
        self.lock().reject_logs = reject;
        self
    }

    pub fn fail_lists(self, fail: bool) -> Self {
        self.lock().fail_lists = fail;
        self
    }

    pub fn set_script(&self, script: BuildScript) {
        self.lock().script = script;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.lock().pods.values().map(|p| p.manifest.clone()).collect()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.lock()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.lock().deployments.values().cloned().collect()
    }

    pub fn services(&self) -> Vec<Service> {
        self.lock().services.values().cloned().collect()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.lock().namespaces.contains(name)
    }

    /// Lines every runtime pod has printed.
    pub fn with_runtime_logs<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().runtime_logs = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn runtime_pods(&self, namespace: &str, deployment: &str) -> Vec<PodState> {
        self.lock()
            .runtime_pods
            .get(&key(namespace, deployment))
            .map(|pods| pods.iter().map(FakePod::state).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl Inner {
    fn pod(&self, namespace: &str, name: &str) -> Option<&FakePod> {
        self.pods.get(&key(namespace, name)).or_else(|| {
            self.runtime_pods
                .values()
                .flatten()
                .find(|p| {
                    let meta = &p.manifest.metadata;
                    meta.namespace == namespace && meta.name == name
                })
        })
    }

    fn running_replicas(&self, deployment: &Deployment) -> Vec<FakePod> {
        let meta = &deployment.metadata;
        let template = &deployment.spec.template;
        (0..deployment.spec.replicas)
            .map(|i| {
                let mut metadata = ObjectMeta::new(format!("{}-{i}", meta.name), &meta.namespace);
                metadata.labels = template.metadata.labels.clone();
                FakePod {
                    manifest: Pod {
                        api_version: "v1".to_string(),
                        kind: "Pod".to_string(),
                        metadata,
                        spec: template.spec.clone(),
                    },
                    pending: VecDeque::new(),
                    phase: PodPhase::Running,
                    script: BuildScript {
                        phases: vec![PodPhase::Running],
                        log_lines: self.runtime_logs.clone(),
                        ..BuildScript::default()
                    },
                }
            })
            .collect()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn ensure_namespace(&self, name: &str) -> ClusterResult<()> {
        let mut inner = self.lock();
        inner.calls.ensure_namespace += 1;
        inner.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()> {
        let mut inner = self.lock();
        inner.calls.create_pod += 1;
        if inner.reject_pods {
            return Err(ClusterError::api("create pod", "admission webhook denied the request"));
        }
        if let Some((label, value)) = pod
            .metadata
            .labels
            .iter()
            .find(|(_, v)| v.len() > MAX_LABEL_VALUE_LEN)
        {
            return Err(ClusterError::api(
                "create pod",
                format!("label {label}: value {value:?} must be no more than 63 characters"),
            ));
        }
        let k = key(&pod.metadata.namespace, &pod.metadata.name);
        if inner.pods.contains_key(&k) {
            return Err(ClusterError::api(
                "create pod",
                format!("pods \"{}\" already exists", pod.metadata.name),
            ));
        }
        let script = inner.script.clone();
        let mut pending: VecDeque<PodPhase> = script.phases.iter().copied().collect();
        let phase = pending.pop_front().unwrap_or(PodPhase::Pending);
        inner.pods.insert(
            k,
            FakePod {
                manifest: pod.clone(),
                pending,
                phase,
                script,
            },
        );
        debug!(pod = %pod.metadata.name, "fake pod created");
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodState> {
        let mut inner = self.lock();
        inner.calls.get_pod += 1;
        inner
            .pod(namespace, name)
            .map(FakePod::state)
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<PodState>> {
        let mut inner = self.lock();
        inner.calls.list_pods += 1;
        if inner.fail_lists {
            return Err(ClusterError::api("list pods", "connection refused"));
        }
        if inner.hidden_lists > 0 {
            inner.hidden_lists -= 1;
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let Inner {
            pods, runtime_pods, ..
        } = &mut *inner;
        for pod in pods.values_mut().chain(runtime_pods.values_mut().flatten()) {
            let m = &pod.manifest.metadata;
            let matches = m.namespace == namespace
                && selector.iter().all(|(k, v)| m.labels.get(k) == Some(v));
            if matches {
                out.push(pod.state());
                pod.advance();
            }
        }
        Ok(out)
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> ClusterResult<LogStream> {
        let mut inner = self.lock();
        inner.calls.pod_logs += 1;
        if inner.reject_logs {
            return Err(ClusterError::LogStream("container is waiting to start".to_string()));
        }
        let pod = inner
            .pod(namespace, name)
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))?;
        let chunks: Vec<ClusterResult<Bytes>> = pod
            .script
            .log_lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect();
        let lines = futures::stream::iter(chunks);
        if pod.script.logs_stay_open {
            Ok(lines.chain(futures::stream::pending()).boxed())
        } else {
            Ok(lines.boxed())
        }
    }

    async fn pod_log_tail(
        &self,
        namespace: &str,
        name: &str,
        lines: Option<i64>,
    ) -> ClusterResult<String> {
        let inner = self.lock();
        let pod = inner
            .pod(namespace, name)
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))?;
        let all = &pod.script.log_lines;
        let keep = lines
            .map(|n| usize::try_from(n).unwrap_or(0))
            .unwrap_or(all.len())
            .min(all.len());
        Ok(all[all.len() - keep..]
            .iter()
            .map(|line| format!("{line}\n"))
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let mut inner = self.lock();
        inner.calls.delete_pod += 1;
        inner.pods.remove(&key(namespace, name));
        Ok(())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<Deployment>> {
        Ok(self.lock().deployments.get(&key(namespace, name)).cloned())
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> ClusterResult<Applied> {
        let mut inner = self.lock();
        inner.calls.apply_deployment += 1;
        let k = key(&deployment.metadata.namespace, &deployment.metadata.name);
        let replicas = inner.running_replicas(deployment);
        inner.runtime_pods.insert(k.clone(), replicas);
        let applied = match inner.deployments.insert(k, deployment.clone()) {
            Some(_) => Applied::Updated,
            None => Applied::Created,
        };
        Ok(applied)
    }

    async fn apply_service(&self, service: &Service) -> ClusterResult<Applied> {
        let mut inner = self.lock();
        inner.calls.apply_service += 1;
        let k = key(&service.metadata.namespace, &service.metadata.name);
        let applied = match inner.services.insert(k, service.clone()) {
            Some(_) => Applied::Updated,
            None => Applied::Created,
        };
        Ok(applied)
    }
}
