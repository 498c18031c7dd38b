//! Workload spec construction.

use std::collections::BTreeMap;

use slipway_core::IntOrPercent;

use crate::manifest::*;

pub const BUILD_POD_PREFIX: &str = "slugbuild";
pub const BUILDER_CONTAINER: &str = "slugbuilder";
pub const RUNNER_CONTAINER: &str = "slugrunner";

/// Label carrying the build pod's own name; the waiter selects on it.
pub const HERITAGE_LABEL: &str = "heritage";
/// Label binding the runtime Deployment, its pods and the Service together.
pub const RUN_LABEL: &str = "run";

pub const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";
pub const SLUG_ANNOTATION: &str = "slipway.io/slug";

pub const ENV_STORAGE: &str = "BUILDER_STORAGE";
pub const ENV_TAR_PATH: &str = "TAR_PATH";
pub const ENV_PUT_PATH: &str = "PUT_PATH";
pub const ENV_DEBUG: &str = "DEIS_DEBUG";
pub const ENV_BUILDPACK_URL: &str = "BUILDPACK_URL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_SLUG_URL: &str = "SLUG_URL";
pub const ENV_APP: &str = "APP";

/// Runtime environment keys Slipway sets itself; app env cannot override them.
pub const RESERVED_RUNTIME_ENV: [&str; 5] =
    [ENV_PORT, ENV_STORAGE, ENV_DEBUG, ENV_SLUG_URL, ENV_APP];

const CREDS_VOLUME: &str = "objectstore-creds";
const CREDS_MOUNT_PATH: &str = "/var/run/secrets/deis/objectstore/creds";

/// Object-store wiring handed to builder and runner containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageBinding {
    /// Storage-kind identifier understood by the images (`s3`, `local`, ...).
    pub kind: String,
    /// Secret holding the object-store credentials.
    pub secret_name: String,
}

/// Cluster-wide inputs shared by every spec Slipway builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecContext {
    pub builder_image: String,
    pub runner_image: String,
    pub runtime_port: u16,
    pub debug: bool,
    pub storage: StorageBinding,
}

/// Unique name for a build pod: `slugbuild-<app>-<short_rev>-<8 hex>`.
///
/// The random suffix keeps concurrent builds of the same revision apart.
pub fn build_pod_name(app: &str, short_rev: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{BUILD_POD_PREFIX}-{app}-{short_rev}-{}", &suffix[..8])
}

/// The ephemeral slug-builder Pod.
///
/// Restart policy is `Never`: retrying a failed build is the caller's call.
pub fn build_pod(
    ctx: &SpecContext,
    debug: bool,
    name: &str,
    namespace: &str,
    source_path: &str,
    dest_path: &str,
    buildpack_url: Option<&str>,
) -> Pod {
    debug_assert!(!name.is_empty(), "build pod name must not be empty");
    debug_assert!(!namespace.is_empty(), "namespace must not be empty");
    debug_assert!(!source_path.is_empty() && !dest_path.is_empty());

    let mut env = BTreeMap::new();
    env.insert(ENV_STORAGE.to_string(), ctx.storage.kind.clone());
    env.insert(ENV_TAR_PATH.to_string(), source_path.to_string());
    env.insert(ENV_PUT_PATH.to_string(), dest_path.to_string());
    if debug {
        env.insert(ENV_DEBUG.to_string(), "1".to_string());
    }
    if let Some(url) = buildpack_url.filter(|u| !u.is_empty()) {
        env.insert(ENV_BUILDPACK_URL.to_string(), url.to_string());
    }

    let container = container(BUILDER_CONTAINER, &ctx.builder_image, None, env);
    Pod {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: ObjectMeta::new(name, namespace).with_label(HERITAGE_LABEL, name),
        spec: pod_spec("Never", container, &ctx.storage),
    }
}

/// The runtime Deployment plus the label selector binding it to its Service.
///
/// Name and selector derive from the app alone so a redeploy updates the same
/// object. Fixed environment keys win over `extra_env`.
#[allow(clippy::too_many_arguments)]
pub fn runtime_deployment(
    ctx: &SpecContext,
    name: &str,
    namespace: &str,
    max_unavailable: IntOrPercent,
    max_surge: IntOrPercent,
    replicas: u32,
    selector: &str,
    slug_url: &str,
    extra_env: &BTreeMap<String, String>,
) -> (Deployment, BTreeMap<String, String>) {
    debug_assert!(!name.is_empty() && !selector.is_empty());
    debug_assert!(!slug_url.is_empty(), "slug url must not be empty");

    let mut env = extra_env.clone();
    env.insert(ENV_PORT.to_string(), ctx.runtime_port.to_string());
    env.insert(ENV_STORAGE.to_string(), ctx.storage.kind.clone());
    env.insert(
        ENV_DEBUG.to_string(),
        if ctx.debug { "1" } else { "0" }.to_string(),
    );
    env.insert(ENV_SLUG_URL.to_string(), slug_url.to_string());
    env.insert(ENV_APP.to_string(), name.to_string());

    let selector_labels = BTreeMap::from([(RUN_LABEL.to_string(), selector.to_string())]);
    let container = container(
        RUNNER_CONTAINER,
        &ctx.runner_image,
        Some(vec!["start".to_string(), "web".to_string()]),
        env,
    );

    let deployment = Deployment {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        metadata: ObjectMeta::new(name, namespace).with_label(RUN_LABEL, name),
        spec: DeploymentSpec {
            replicas,
            selector: LabelSelector {
                match_labels: selector_labels.clone(),
            },
            strategy: DeploymentStrategy {
                type_: "RollingUpdate".to_string(),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable,
                    max_surge,
                }),
            },
            template: PodTemplateSpec {
                metadata: TemplateMeta {
                    labels: selector_labels.clone(),
                    annotations: BTreeMap::new(),
                },
                spec: pod_spec("Always", container, &ctx.storage),
            },
        },
    };
    (deployment, selector_labels)
}

/// A LoadBalancer Service mapping `external_port` to the runtime port.
pub fn exposure_service(
    name: &str,
    namespace: &str,
    selector: &str,
    external_port: u16,
    internal_port: u16,
) -> Service {
    debug_assert!(!name.is_empty() && !selector.is_empty());

    Service {
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        metadata: ObjectMeta::new(name, namespace).with_label(RUN_LABEL, name),
        spec: ServiceSpec {
            type_: "LoadBalancer".to_string(),
            selector: BTreeMap::from([(RUN_LABEL.to_string(), selector.to_string())]),
            ports: vec![ServicePort {
                protocol: "TCP".to_string(),
                port: external_port,
                target_port: internal_port,
            }],
        },
    }
}

fn container(
    name: &str,
    image: &str,
    args: Option<Vec<String>>,
    env: BTreeMap<String, String>,
) -> Container {
    Container {
        name: name.to_string(),
        image: image.to_string(),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args,
        env: env
            .into_iter()
            .map(|(name, value)| EnvVar { name, value })
            .collect(),
        volume_mounts: vec![VolumeMount {
            name: CREDS_VOLUME.to_string(),
            mount_path: CREDS_MOUNT_PATH.to_string(),
            read_only: Some(true),
        }],
    }
}

fn pod_spec(restart_policy: &str, container: Container, storage: &StorageBinding) -> PodSpec {
    PodSpec {
        restart_policy: restart_policy.to_string(),
        containers: vec![container],
        volumes: vec![Volume {
            name: CREDS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: storage.secret_name.clone(),
            }),
        }],
    }
}
