//! The deployment orchestrator.
//!
//! One run goes upload → build pod → started → logs + finished (raced) →
//! exit-code check → runtime Deployment → Service → record finalized. Every
//! outcome ends with exactly one marker line on the progress channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use slipway_auth::{AuthService, Identity};
use slipway_cluster::{
    ClusterClient, ClusterError, LogStream, pod_finished, pod_started, wait_for_pod,
};
use slipway_core::{AppName, short_revision};
use slipway_spec::builder::{CHANGE_CAUSE_ANNOTATION, SLUG_ANNOTATION};
use slipway_spec::{build_pod, build_pod_name, exposure_service, runtime_deployment};
use slipway_state::{App, DeployOrigin, DeploymentRecord, DeploymentStatus, StateStore};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::phase::DeployPhase;
use crate::storage::ObjectStorage;
use crate::stream::ProgressChannel;
use crate::tail::LogTail;

/// How long build output keeps draining after the build wait has failed.
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Last line of a successful deployment.
pub const SUCCESS_MARKER: &str = "----------deployment-success----------";
/// Last line of a failed deployment.
pub const ERROR_MARKER: &str = "----------deployment-error----------";

/// A tarball push as received from the caller.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub token: String,
    pub app: String,
    pub description: String,
    pub origin: DeployOrigin,
    pub tarball: Bytes,
}

/// Result of a run: the finalized record and, on failure, why.
#[derive(Debug)]
pub struct DeployOutcome {
    pub record: DeploymentRecord,
    pub error: Option<DeployError>,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Shared entry point for deployments. Cheap to clone.
#[derive(Clone)]
pub struct Deployer {
    store: StateStore,
    auth: AuthService,
    cluster: Arc<dyn ClusterClient>,
    storage: Arc<dyn ObjectStorage>,
    config: Arc<DeployConfig>,
}

impl Deployer {
    pub fn new(
        store: StateStore,
        auth: AuthService,
        cluster: Arc<dyn ClusterClient>,
        storage: Arc<dyn ObjectStorage>,
        config: DeployConfig,
    ) -> Self {
        Self {
            store,
            auth,
            cluster,
            storage,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Everything that can fail before output starts.
    ///
    /// On error nothing has been written to the store, the cluster or object
    /// storage.
    pub fn prepare(&self, request: DeployRequest) -> DeployResult<PreparedDeploy> {
        debug!(app = %request.app, phase = %DeployPhase::Requested, "deploy requested");
        let name = AppName::parse(&request.app)?;
        if request.tarball.is_empty() {
            return Err(DeployError::Input("source tarball is empty".to_string()));
        }

        debug!(app = %name, phase = %DeployPhase::Authorizing, "deploy authorizing");
        let identity = self.auth.verify(&request.token)?;
        let app = self
            .store
            .get_app(name.as_str())?
            .ok_or_else(|| DeployError::NotFound(format!("app {name}")))?;
        if let Err(e) = identity.authorize(&app.team) {
            warn!(app = %name, user = %identity.email, team = %app.team, "deploy refused");
            return Err(e.into());
        }

        let record = DeploymentRecord::start(name, request.description, request.origin);
        self.store.create_deployment(&record)?;
        info!(
            app = %app.name,
            user = %identity.email,
            deploy_id = %record.id,
            bytes = request.tarball.len(),
            "deployment accepted"
        );
        Ok(PreparedDeploy {
            deployer: self.clone(),
            app,
            identity,
            record,
            tarball: request.tarball,
        })
    }

    /// `prepare` then `run`. A rejected request is also reported in-band.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        progress: &mut ProgressChannel,
    ) -> DeployResult<DeployOutcome> {
        match self.prepare(request) {
            Ok(prepared) => Ok(prepared.run(progress).await),
            Err(e) => {
                warn!(error = %e, "deploy rejected");
                write_error(progress, &e).await;
                Err(e)
            }
        }
    }
}

/// An authorized deployment with its `running` record already stored.
pub struct PreparedDeploy {
    deployer: Deployer,
    app: App,
    identity: Identity,
    record: DeploymentRecord,
    tarball: Bytes,
}

impl PreparedDeploy {
    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Run the deployment to completion, streaming progress.
    ///
    /// Never fails: the outcome carries the error and the record is finalized
    /// either way. A closed progress channel does not stop the run.
    pub async fn run(self, progress: &mut ProgressChannel) -> DeployOutcome {
        let span = info_span!(
            "deploy",
            app = %self.app.name,
            user = %self.identity.email,
            deploy_id = %self.record.id,
        );
        self.run_to_end(progress).instrument(span).await
    }

    async fn run_to_end(self, progress: &mut ProgressChannel) -> DeployOutcome {
        let result = self.execute(progress).await;

        let (phase, status, error_text) = match &result {
            Ok(()) => {
                info!(phase = %DeployPhase::Exposed, "deployment finished");
                (DeployPhase::Exposed, DeploymentStatus::Succeeded, None)
            }
            Err(e) if e.is_build_failure() => {
                let phase = DeployPhase::BuildTerminal { succeeded: false };
                warn!(%phase, error = %e, "build failed");
                (phase, DeploymentStatus::Failed, Some(e.record_text()))
            }
            Err(e) => {
                error!(phase = %DeployPhase::Aborted, error = %e, "deployment aborted");
                (DeployPhase::Aborted, DeploymentStatus::Failed, Some(e.record_text()))
            }
        };
        debug_assert!(phase.is_final(), "{phase} is not a final phase");

        let store = &self.deployer.store;
        let record = match store.finish_deployment(
            self.app.name.as_str(),
            &self.record.id,
            status,
            error_text.clone(),
        ) {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "failed to finalize deployment record");
                let mut record = self.record.clone();
                record.status = status;
                record.error = error_text;
                record
            }
        };

        match &result {
            Ok(()) => {
                progress.line(SUCCESS_MARKER).await;
            }
            Err(e) => write_error(progress, e).await,
        }
        DeployOutcome {
            record,
            error: result.err(),
        }
    }

    async fn execute(&self, progress: &mut ProgressChannel) -> DeployResult<()> {
        let config = &self.deployer.config;
        let cluster = self.deployer.cluster.as_ref();
        let app = self.app.name.as_str();
        let namespace = app;
        let id = &self.record.id;
        let source_path = format!("deploys/{app}/{id}/in/app.tgz");
        let slug_path = format!("deploys/{app}/{id}/out/slug.tgz");

        progress.line("uploading app archive to storage...").await;
        self.deployer
            .storage
            .upload_file(&source_path, self.tarball.clone())
            .await
            .map_err(|e| DeployError::Platform(format!("upload {source_path}: {e}")))?;
        progress.line("upload done").await;

        let pod_name = build_pod_name(app, &short_revision(&self.tarball));
        let pod = build_pod(
            &config.spec,
            config.spec.debug,
            &pod_name,
            namespace,
            &source_path,
            &slug_path,
            config.buildpack_url.as_deref(),
        );
        let selector = pod.metadata.labels.clone();

        progress.line("building app...").await;
        cluster.create_pod(&pod).await?;
        info!(phase = %DeployPhase::BuildSubmitted, pod = %pod_name, "build pod submitted");

        wait_for_pod(
            cluster,
            namespace,
            &selector,
            config.poll_interval,
            config.start_timeout,
            pod_started,
        )
        .await?;
        info!(phase = %DeployPhase::BuildRunning, pod = %pod_name, "build pod running");

        let logs = cluster.pod_logs(namespace, &pod_name).await?;
        info!(phase = %DeployPhase::Streaming, pod = %pod_name, "streaming build output");

        let mut tail = LogTail::default();
        let finished = {
            let copy = copy_logs(logs, progress, &mut tail);
            let wait = wait_for_pod(
                cluster,
                namespace,
                &selector,
                config.poll_interval,
                config.finish_timeout,
                pod_finished,
            );
            tokio::pin!(copy, wait);
            tokio::select! {
                finished = &mut wait => {
                    if finished.is_ok() {
                        (&mut copy).await;
                    } else if tokio::time::timeout(LOG_DRAIN_GRACE, &mut copy).await.is_err() {
                        warn!(pod = %pod_name, "build log stream still open, dropping it");
                    }
                    finished
                }
                () = &mut copy => wait.await,
            }
        };
        let log_tail = tail.finish();
        match finished {
            Ok(_) => {}
            // The platform verdict stands; exit codes are not consulted.
            Err(ClusterError::PodFailed { message, .. }) => {
                return Err(DeployError::BuildFailed {
                    message: format!("build pod failed: {message}"),
                    log_tail,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let state = cluster.get_pod(namespace, &pod_name).await?;
        if let Some(exit) = state.failed_exit() {
            return Err(DeployError::BuildFailed {
                message: format!("build exited with code {}", exit.exit_code),
                log_tail,
            });
        }
        let phase = DeployPhase::BuildTerminal { succeeded: true };
        info!(%phase, pod = %pod_name, "build succeeded");

        let rolling = &self.app.rolling_update;
        let (mut deployment, labels) = runtime_deployment(
            &config.spec,
            app,
            namespace,
            rolling.max_unavailable,
            rolling.max_surge,
            self.app.scale,
            app,
            &slug_path,
            &self.app.env,
        );
        deployment
            .metadata
            .annotations
            .insert(CHANGE_CAUSE_ANNOTATION.to_string(), self.record.description.clone());
        deployment
            .spec
            .template
            .metadata
            .annotations
            .insert(SLUG_ANNOTATION.to_string(), slug_path.clone());
        debug!(replicas = self.app.scale, ?labels, "runtime deployment built");

        progress.line("rolling update...").await;
        let applied = cluster.apply_deployment(&deployment).await?;
        info!(phase = %DeployPhase::RuntimeSubmitted, ?applied, "runtime deployment applied");

        let service = exposure_service(
            app,
            namespace,
            app,
            config.external_port,
            config.spec.runtime_port,
        );
        let applied = cluster.apply_service(&service).await?;
        debug!(?applied, port = config.external_port, "service applied");
        progress.line("done").await;
        Ok(())
    }
}

/// Forward build output to the caller and keep its tail.
///
/// Draining continues after the caller goes away so the tail stays complete.
async fn copy_logs(mut logs: LogStream, progress: &mut ProgressChannel, tail: &mut LogTail) {
    while let Some(chunk) = logs.next().await {
        match chunk {
            Ok(bytes) => {
                tail.feed(&bytes);
                progress.write(bytes).await;
            }
            Err(e) => {
                warn!(error = %e, "build log stream broke");
                break;
            }
        }
    }
}

async fn write_error(progress: &mut ProgressChannel, err: &DeployError) {
    progress
        .line(format!("deploy finished with the error: {}", err.caller_message()))
        .await;
    progress.line(ERROR_MARKER).await;
}
