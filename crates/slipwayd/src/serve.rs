//! `slipwayd serve`: wire the store, keys, cluster and object storage into
//! the API router and run it until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use slipway_api::{ApiState, build_router};
use slipway_auth::{AuthConfig, AuthService, SigningKeys};
use slipway_cluster::{ClusterClient, FakeCluster, KubeClusterClient};
use slipway_core::SlipwayConfig;
use slipway_deploy::{AppService, DeployConfig, Deployer, LocalStorage, ObjectStorage};
use slipway_spec::StorageBinding;
use tracing::{info, warn};

use crate::admin;

pub async fn run(
    config: SlipwayConfig,
    listen: Option<String>,
    fake_cluster: bool,
) -> anyhow::Result<()> {
    info!("Slipway daemon starting");

    // ── Metadata store and keys ────────────────────────────────

    let store = admin::open_store(&config)?;

    let keys = SigningKeys::load(&config.auth.private_key_path, &config.auth.public_key_path)
        .context("loading token signing keys")?;
    let auth = AuthService::new(store.clone(), Arc::new(keys), AuthConfig::from(&config.auth));
    info!(issuer = %config.auth.issuer, "signing keys loaded");

    // ── Cluster and object storage ─────────────────────────────

    let cluster: Arc<dyn ClusterClient> = if fake_cluster {
        warn!("using in-memory cluster, nothing will actually run");
        Arc::new(FakeCluster::new())
    } else {
        let client = KubeClusterClient::try_default()
            .await
            .context("connecting to Kubernetes")?;
        info!("kubernetes client ready");
        Arc::new(client)
    };

    std::fs::create_dir_all(&config.storage.root)?;
    let storage = LocalStorage::new(
        &config.storage.root,
        &config.storage.kind,
        &config.storage.secret_name,
    );
    info!(root = %storage.root().display(), kind = %storage.kind(), "object storage ready");
    let binding = StorageBinding {
        kind: storage.kind().to_string(),
        secret_name: storage.secret_name().to_string(),
    };
    let deploy_config = DeployConfig::new(&config, binding);

    // ── API server ─────────────────────────────────────────────

    let state = ApiState {
        auth: auth.clone(),
        apps: AppService::new(store.clone(), auth.clone(), cluster.clone()),
        deployer: Deployer::new(store, auth, cluster, Arc::new(storage), deploy_config),
    };
    let router = build_router(state);

    let listen = listen.unwrap_or_else(|| config.server.listen.clone());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen:?}"))?;
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C. Running deployments are not awaited.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("Slipway daemon stopped");
    Ok(())
}
