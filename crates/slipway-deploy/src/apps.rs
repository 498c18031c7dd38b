//! App registration, queries and runtime settings.
//!
//! Env and scale changes are stored on the app and, once the app has been
//! deployed, applied to its live runtime Deployment. Before the first deploy
//! they only take effect through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slipway_auth::{AuthService, Identity};
use slipway_cluster::{ClusterClient, PodPhase};
use slipway_core::{AppName, IntOrPercent, RollingUpdate, TeamName};
use slipway_spec::EnvVar;
use slipway_spec::builder::{RESERVED_RUNTIME_ENV, RUN_LABEL};
use slipway_state::{App, DeploymentRecord, StateStore};
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};

/// Request body for creating an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApp {
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub max_unavailable: Option<IntOrPercent>,
    #[serde(default)]
    pub max_surge: Option<IntOrPercent>,
}

impl CreateApp {
    pub fn new(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            scale: None,
            env: BTreeMap::new(),
            max_unavailable: None,
            max_surge: None,
        }
    }
}

#[derive(Clone)]
pub struct AppService {
    store: StateStore,
    auth: AuthService,
    cluster: Arc<dyn ClusterClient>,
}

impl AppService {
    pub fn new(store: StateStore, auth: AuthService, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            store,
            auth,
            cluster,
        }
    }

    /// Register an app for a team the caller belongs to and create its
    /// namespace.
    pub async fn create_app(&self, token: &str, request: CreateApp) -> DeployResult<App> {
        let identity = self.auth.verify(token)?;
        let name = AppName::parse(&request.name)?;
        let team = TeamName::parse(&request.team)?;
        if request.scale == Some(0) {
            return Err(DeployError::Input("scale must be at least 1".to_string()));
        }
        check_env_keys(request.env.keys())?;
        if self.store.get_team(team.as_str())?.is_none() {
            return Err(DeployError::NotFound(format!("team {team}")));
        }
        if let Err(e) = identity.authorize(&team) {
            warn!(app = %name, %team, user = %identity.email, "app creation refused");
            return Err(e.into());
        }
        if self.store.get_app(name.as_str())?.is_some() {
            return Err(DeployError::Conflict(format!("app {name}")));
        }

        let defaults = RollingUpdate::default();
        let mut app = App::new(name, team);
        app.scale = request.scale.unwrap_or(1);
        app.env = request.env;
        app.rolling_update = RollingUpdate {
            max_unavailable: request.max_unavailable.unwrap_or(defaults.max_unavailable),
            max_surge: request.max_surge.unwrap_or(defaults.max_surge),
        };

        self.cluster.ensure_namespace(app.name.as_str()).await?;
        self.store.create_app(&app)?;
        info!(app = %app.name, team = %app.team, user = %identity.email, "app created");
        Ok(app)
    }

    /// Every app for admins, the apps of the caller's teams otherwise.
    pub fn list_apps(&self, token: &str) -> DeployResult<Vec<App>> {
        let identity = self.auth.verify(token)?;
        let apps = self.store.list_apps()?;
        Ok(apps
            .into_iter()
            .filter(|app| identity.is_admin || identity.is_member(&app.team))
            .collect())
    }

    pub fn get_app(&self, token: &str, name: &str) -> DeployResult<App> {
        let identity = self.auth.verify(token)?;
        self.authorized_app(&identity, name)
    }

    /// Deployment history, newest first.
    pub fn list_deployments(&self, token: &str, name: &str) -> DeployResult<Vec<DeploymentRecord>> {
        let identity = self.auth.verify(token)?;
        let app = self.authorized_app(&identity, name)?;
        Ok(self.store.list_deployments_for_app(app.name.as_str())?)
    }

    /// Recent output of the app's running pods, each line prefixed with
    /// `[<pod>] - `.
    pub async fn app_logs(
        &self,
        token: &str,
        name: &str,
        lines: Option<i64>,
    ) -> DeployResult<String> {
        let identity = self.auth.verify(token)?;
        let app = self.authorized_app(&identity, name)?;
        if lines.is_some_and(|n| n < 1) {
            return Err(DeployError::Input("lines must be at least 1".to_string()));
        }

        let namespace = app.name.as_str();
        let selector = BTreeMap::from([(RUN_LABEL.to_string(), namespace.to_string())]);
        let pods = self.cluster.list_pods(namespace, &selector).await?;
        let mut out = String::new();
        for pod in pods.iter().filter(|p| p.phase == PodPhase::Running) {
            match self.cluster.pod_log_tail(namespace, &pod.name, lines).await {
                Ok(text) => {
                    for line in text.lines() {
                        out.push_str(&format!("[{}] - {line}\n", pod.name));
                    }
                }
                Err(e) => {
                    warn!(app = %app.name, pod = %pod.name, error = %e, "pod logs unavailable")
                }
            }
        }
        Ok(out)
    }

    /// Add or overwrite environment variables.
    pub async fn set_env(
        &self,
        token: &str,
        name: &str,
        env: BTreeMap<String, String>,
    ) -> DeployResult<App> {
        let identity = self.auth.verify(token)?;
        let mut app = self.authorized_app(&identity, name)?;
        if env.is_empty() {
            return Err(DeployError::Input("no variables given".to_string()));
        }
        check_env_keys(env.keys())?;

        let keys: Vec<String> = env.keys().cloned().collect();
        app.env.extend(env);
        self.update_runtime(&app).await?;
        self.store.put_app(&app)?;
        info!(app = %app.name, user = %identity.email, ?keys, "env set");
        Ok(app)
    }

    /// Remove environment variables. Unknown keys are ignored.
    pub async fn unset_env(&self, token: &str, name: &str, keys: &[String]) -> DeployResult<App> {
        let identity = self.auth.verify(token)?;
        let mut app = self.authorized_app(&identity, name)?;
        if keys.is_empty() {
            return Err(DeployError::Input("no variables given".to_string()));
        }
        check_env_keys(keys)?;

        for key in keys {
            app.env.remove(key);
        }
        self.update_runtime(&app).await?;
        self.store.put_app(&app)?;
        info!(app = %app.name, user = %identity.email, ?keys, "env unset");
        Ok(app)
    }

    pub async fn set_scale(&self, token: &str, name: &str, scale: u32) -> DeployResult<App> {
        let identity = self.auth.verify(token)?;
        let mut app = self.authorized_app(&identity, name)?;
        if scale == 0 {
            return Err(DeployError::Input("scale must be at least 1".to_string()));
        }

        app.scale = scale;
        self.update_runtime(&app).await?;
        self.store.put_app(&app)?;
        info!(app = %app.name, user = %identity.email, scale, "app scaled");
        Ok(app)
    }

    /// Push the app's scale and env onto its live Deployment, if there is one.
    async fn update_runtime(&self, app: &App) -> DeployResult<bool> {
        let name = app.name.as_str();
        let Some(mut deployment) = self.cluster.get_deployment(name, name).await? else {
            debug!(app = %app.name, "not deployed yet, settings apply on first deploy");
            return Ok(false);
        };

        deployment.spec.replicas = app.scale;
        for container in &mut deployment.spec.template.spec.containers {
            let mut env = app.env.clone();
            for var in &container.env {
                if RESERVED_RUNTIME_ENV.contains(&var.name.as_str()) {
                    env.insert(var.name.clone(), var.value.clone());
                }
            }
            container.env = env
                .into_iter()
                .map(|(name, value)| EnvVar { name, value })
                .collect();
        }
        let applied = self.cluster.apply_deployment(&deployment).await?;
        debug!(app = %app.name, ?applied, replicas = app.scale, "runtime deployment updated");
        Ok(true)
    }

    fn authorized_app(&self, identity: &Identity, name: &str) -> DeployResult<App> {
        let name = AppName::parse(name)?;
        let app = self
            .store
            .get_app(name.as_str())?
            .ok_or_else(|| DeployError::NotFound(format!("app {name}")))?;
        identity.authorize(&app.team)?;
        Ok(app)
    }
}

fn check_env_keys<I, K>(keys: I) -> DeployResult<()>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    for key in keys {
        let key = key.as_ref();
        if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
            return Err(DeployError::Input(format!("invalid env name {key:?}")));
        }
        if RESERVED_RUNTIME_ENV.contains(&key) {
            return Err(DeployError::Input(format!("{key} is set by the platform")));
        }
    }
    Ok(())
}
