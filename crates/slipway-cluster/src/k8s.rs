//! kube-rs implementation of [`ClusterClient`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{AsyncBufRead, AsyncBufReadExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment as K8sDeployment;
use k8s_openapi::api::core::v1::{Namespace, Pod as K8sPod, Service as K8sService};
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use slipway_spec::{Deployment, Pod, Service};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::{Applied, ClusterClient, LogStream, selector_string};
use crate::error::{ClusterError, ClusterResult};
use crate::pod::{ContainerExit, PodPhase, PodState};

/// Field manager recorded for server-side apply.
const FIELD_MANAGER: &str = "slipway";

/// Log chunks buffered between the reader task and the consumer.
const LOG_BUFFER: usize = 64;

/// Thin adapter over a kube [`Client`]. Performs no retries.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from in-cluster config or the local kubeconfig.
    pub async fn try_default() -> ClusterResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<K8sPod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Re-type a manifest through its JSON form.
fn convert<T: DeserializeOwned>(manifest: &impl Serialize) -> ClusterResult<T> {
    let value = serde_json::to_value(manifest).map_err(|e| ClusterError::Manifest(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ClusterError::Manifest(e.to_string()))
}

fn api_error(operation: &str, name: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound(name.to_string()),
        other => ClusterError::api(format!("{operation} {name}"), other),
    }
}

fn pod_state(pod: &K8sPod) -> PodState {
    let status = pod.status.as_ref();
    let exits = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|cs| {
                    let terminated = cs.state.as_ref()?.terminated.as_ref()?;
                    Some(ContainerExit {
                        container: cs.name.clone(),
                        exit_code: terminated.exit_code,
                        reason: terminated.reason.clone(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    PodState {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        phase: status
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::parse)
            .unwrap_or(PodPhase::Unknown),
        message: status.and_then(|s| s.message.clone()),
        exits,
    }
}

/// Server-side apply; reports whether the object existed beforehand.
async fn apply<K, M>(api: &Api<K>, name: &str, manifest: &M) -> ClusterResult<Applied>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
    M: Serialize + std::fmt::Debug,
{
    let existed = api
        .get_opt(name)
        .await
        .map_err(|e| api_error("get", name, e))?
        .is_some();
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(name, &params, &Patch::Apply(manifest))
        .await
        .map_err(|e| api_error("apply", name, e))?;
    Ok(if existed {
        Applied::Updated
    } else {
        Applied::Created
    })
}

/// Relay raw output chunks as they arrive. Build output is not necessarily
/// UTF-8, so nothing is decoded or re-framed here.
async fn forward_chunks<R>(reader: R, tx: &mpsc::Sender<ClusterResult<Bytes>>, pod: &str)
where
    R: AsyncBufRead,
{
    let mut reader = Box::pin(reader);
    loop {
        let chunk = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(buf) => Bytes::copy_from_slice(buf),
            Err(e) => {
                let _ = tx.send(Err(ClusterError::LogStream(e.to_string()))).await;
                break;
            }
        };
        reader.consume_unpin(chunk.len());
        if tx.send(Ok(chunk)).await.is_err() {
            debug!(%pod, "log reader dropped, closing stream");
            break;
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn ensure_namespace(&self, name: &str) -> ClusterResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name }
        });
        let applied = apply(&api, name, &ns).await?;
        debug!(namespace = %name, ?applied, "namespace ensured");
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()> {
        let k8s_pod: K8sPod = convert(pod)?;
        self.pods(&pod.metadata.namespace)
            .create(&PostParams::default(), &k8s_pod)
            .await
            .map_err(|e| api_error("create pod", &pod.metadata.name, e))?;
        info!(pod = %pod.metadata.name, namespace = %pod.metadata.namespace, "pod created");
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<PodState> {
        let pod = self
            .pods(namespace)
            .get(name)
            .await
            .map_err(|e| api_error("get pod", name, e))?;
        Ok(pod_state(&pod))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<PodState>> {
        let selector = selector_string(selector);
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| api_error("list pods", &selector, e))?;
        Ok(list.items.iter().map(pod_state).collect())
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> ClusterResult<LogStream> {
        let api = self.pods(namespace);
        let pod = name.to_string();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel::<ClusterResult<Bytes>>(LOG_BUFFER);

        // The reader borrows its Api, so both live in one task that forwards
        // chunks until the stream ends or the receiver is dropped.
        tokio::spawn(async move {
            let params = LogParams {
                follow: true,
                ..LogParams::default()
            };
            let reader = match api.log_stream(&pod, &params).await {
                Ok(reader) => {
                    let _ = opened_tx.send(Ok(()));
                    reader
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(ClusterError::LogStream(format!("{pod}: {e}"))));
                    return;
                }
            };
            forward_chunks(reader, &tx, &pod).await;
        });

        opened_rx
            .await
            .map_err(|_| ClusterError::LogStream(format!("{name}: log task ended")))??;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(stream.boxed())
    }

    async fn pod_log_tail(
        &self,
        namespace: &str,
        name: &str,
        lines: Option<i64>,
    ) -> ClusterResult<String> {
        let params = LogParams {
            tail_lines: lines,
            ..LogParams::default()
        };
        self.pods(namespace)
            .logs(name, &params)
            .await
            .map_err(|e| api_error("pod logs", name, e))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        match self.pods(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(api_error("delete pod", name, e)),
        }
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<Deployment>> {
        let api: Api<K8sDeployment> = Api::namespaced(self.client.clone(), namespace);
        let live = api
            .get_opt(name)
            .await
            .map_err(|e| api_error("get deployment", name, e))?;
        live.map(|d| convert(&d)).transpose()
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> ClusterResult<Applied> {
        let api: Api<K8sDeployment> =
            Api::namespaced(self.client.clone(), &deployment.metadata.namespace);
        let applied = apply(&api, &deployment.metadata.name, deployment).await?;
        info!(deployment = %deployment.metadata.name, ?applied, "deployment applied");
        Ok(applied)
    }

    async fn apply_service(&self, service: &Service) -> ClusterResult<Applied> {
        let api: Api<K8sService> = Api::namespaced(self.client.clone(), &service.metadata.namespace);
        let applied = apply(&api, &service.metadata.name, service).await?;
        info!(service = %service.metadata.name, ?applied, "service applied");
        Ok(applied)
    }
}
