//! Orchestrator settings derived from `slipway.toml`.

use std::time::Duration;

use slipway_core::SlipwayConfig;
use slipway_spec::{SpecContext, StorageBinding};

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub spec: SpecContext,
    pub poll_interval: Duration,
    /// Deadline for the build pod to start running.
    pub start_timeout: Duration,
    /// Deadline for the build pod to finish once running.
    pub finish_timeout: Duration,
    pub buildpack_url: Option<String>,
    pub external_port: u16,
}

impl DeployConfig {
    /// Storage wiring comes from the object store actually in use.
    pub fn new(config: &SlipwayConfig, storage: StorageBinding) -> Self {
        let deploy = &config.deploy;
        Self {
            spec: SpecContext {
                builder_image: deploy.builder_image.clone(),
                runner_image: deploy.runner_image.clone(),
                runtime_port: deploy.runtime_port,
                debug: deploy.debug,
                storage,
            },
            poll_interval: deploy.poll_interval(),
            start_timeout: deploy.start_timeout(),
            finish_timeout: deploy.finish_timeout(),
            buildpack_url: deploy.buildpack_url.clone(),
            external_port: deploy.external_port,
        }
    }
}
