//! App registration, queries and runtime settings.

mod common;

use common::*;
use std::collections::BTreeMap;

use slipway_cluster::FakeCluster;
use slipway_core::IntOrPercent;
use slipway_deploy::{CreateApp, DeployError};

#[tokio::test]
async fn member_creates_app_with_namespace() {
    let h = harness(FakeCluster::new());
    let mut request = CreateApp::new("web", "bar");
    request.scale = Some(3);
    request.max_surge = Some(IntOrPercent::Int(2));
    request.env.insert("RUST_LOG".into(), "info".into());

    let app = h.apps.create_app(&h.token(ALICE), request).await.unwrap();

    assert_eq!(app.scale, 3);
    assert_eq!(app.team.as_str(), "bar");
    assert_eq!(app.rolling_update.max_surge, IntOrPercent::Int(2));
    assert_eq!(app.rolling_update.max_unavailable, IntOrPercent::Percent(10));
    assert!(h.cluster.has_namespace("web"));
    assert_eq!(h.store.get_app("web").unwrap().unwrap(), app);
}

#[tokio::test]
async fn non_member_cannot_create_for_team() {
    let h = harness(FakeCluster::new());
    let err = h
        .apps
        .create_app(&h.token(BOB), CreateApp::new("web", "bar"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Auth(_)));
    assert_eq!(h.cluster.calls().ensure_namespace, 0);
    assert!(h.store.get_app("web").unwrap().is_none());
}

#[tokio::test]
async fn admin_creates_for_any_team() {
    let h = harness(FakeCluster::new());
    let app = h
        .apps
        .create_app(&h.token(ROOT), CreateApp::new("api", "baz"))
        .await
        .unwrap();
    assert_eq!(app.team.as_str(), "baz");
}

#[tokio::test]
async fn duplicate_and_unknown_team() {
    let h = harness(FakeCluster::new());
    let token = h.token(ALICE);

    let dup = h
        .apps
        .create_app(&token, CreateApp::new("foo", "bar"))
        .await
        .unwrap_err();
    assert!(matches!(dup, DeployError::Conflict(_)));

    let missing = h
        .apps
        .create_app(&token, CreateApp::new("web", "nobody"))
        .await
        .unwrap_err();
    assert!(matches!(missing, DeployError::NotFound(_)));

    let mut zero = CreateApp::new("web", "bar");
    zero.scale = Some(0);
    assert!(matches!(
        h.apps.create_app(&token, zero).await,
        Err(DeployError::Input(_))
    ));
}

#[tokio::test]
async fn history_is_visible_to_team_only() {
    let h = harness(FakeCluster::new());
    let (mut progress, _) = memory_progress();
    h.deployer
        .deploy(h.request(ALICE, "foo"), &mut progress)
        .await
        .unwrap();

    let history = h.apps.list_deployments(&h.token(ALICE), "foo").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(h.apps.get_app(&h.token(ALICE), "foo").unwrap().name.as_str(), "foo");

    assert!(matches!(
        h.apps.list_deployments(&h.token(BOB), "foo"),
        Err(DeployError::Auth(_))
    ));
    assert!(matches!(
        h.apps.get_app(&h.token(ALICE), "missing"),
        Err(DeployError::NotFound(_))
    ));
}

async fn deployed(cluster: FakeCluster) -> Harness {
    let h = harness(cluster);
    let (mut progress, _) = memory_progress();
    let outcome = h
        .deployer
        .deploy(h.request(ALICE, "foo"), &mut progress)
        .await
        .unwrap();
    assert!(outcome.succeeded());
    h
}

fn runtime_env(h: &Harness, key: &str) -> Option<String> {
    let deployment = h.cluster.deployment("foo", "foo").unwrap();
    deployment.spec.template.spec.containers[0]
        .env_value(key)
        .map(str::to_string)
}

#[tokio::test]
async fn app_list_is_scoped_to_teams() {
    let h = harness(FakeCluster::new());
    h.apps
        .create_app(&h.token(BOB), CreateApp::new("api", "baz"))
        .await
        .unwrap();

    let names = |email: &str| -> Vec<String> {
        h.apps
            .list_apps(&h.token(email))
            .unwrap()
            .into_iter()
            .map(|a| a.name.to_string())
            .collect()
    };
    assert_eq!(names(ALICE), vec!["foo"]);
    assert_eq!(names(BOB), vec!["api"]);
    assert_eq!(names(ROOT).len(), 2);
}

#[tokio::test]
async fn logs_come_from_running_pods() {
    let h = deployed(FakeCluster::new().with_runtime_logs(["booting", "listening on 5000"])).await;

    let logs = h
        .apps
        .app_logs(&h.token(ALICE), "foo", Some(1))
        .await
        .unwrap();
    assert_eq!(logs, "[foo-0] - listening on 5000\n");

    let all = h.apps.app_logs(&h.token(ALICE), "foo", None).await.unwrap();
    assert_eq!(all.lines().count(), 2);

    assert!(matches!(
        h.apps.app_logs(&h.token(BOB), "foo", None).await,
        Err(DeployError::Auth(_))
    ));
    assert!(matches!(
        h.apps.app_logs(&h.token(ALICE), "foo", Some(0)).await,
        Err(DeployError::Input(_))
    ));
}

#[tokio::test]
async fn logs_before_first_deploy_are_empty() {
    let h = harness(FakeCluster::new());
    let logs = h.apps.app_logs(&h.token(ALICE), "foo", None).await.unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn env_changes_reach_the_live_deployment() {
    let h = deployed(FakeCluster::new()).await;
    let token = h.token(ALICE);
    let slug = runtime_env(&h, "SLUG_URL");

    let env = BTreeMap::from([
        ("DATABASE_URL".to_string(), "postgres://db".to_string()),
        ("RUST_LOG".to_string(), "debug".to_string()),
    ]);
    let app = h.apps.set_env(&token, "foo", env).await.unwrap();
    assert_eq!(app.env.len(), 2);
    assert_eq!(runtime_env(&h, "DATABASE_URL").as_deref(), Some("postgres://db"));
    assert_eq!(runtime_env(&h, "SLUG_URL"), slug);
    assert_eq!(h.store.get_app("foo").unwrap().unwrap().env, app.env);

    let app = h
        .apps
        .unset_env(&token, "foo", &["RUST_LOG".to_string(), "NEVER_SET".to_string()])
        .await
        .unwrap();
    assert_eq!(app.env.keys().collect::<Vec<_>>(), vec!["DATABASE_URL"]);
    assert_eq!(runtime_env(&h, "RUST_LOG"), None);
    assert_eq!(runtime_env(&h, "PORT").as_deref(), Some("5000"));

    // The next deploy keeps the stored env.
    let (mut progress, _) = memory_progress();
    h.deployer
        .deploy(h.request(ALICE, "foo"), &mut progress)
        .await
        .unwrap();
    assert_eq!(runtime_env(&h, "DATABASE_URL").as_deref(), Some("postgres://db"));
}

#[tokio::test]
async fn platform_env_keys_are_refused() {
    let h = deployed(FakeCluster::new()).await;
    let token = h.token(ALICE);

    let env = BTreeMap::from([("SLUG_URL".to_string(), "evil".to_string())]);
    assert!(matches!(
        h.apps.set_env(&token, "foo", env).await,
        Err(DeployError::Input(_))
    ));
    assert!(matches!(
        h.apps.unset_env(&token, "foo", &["PORT".to_string()]).await,
        Err(DeployError::Input(_))
    ));
    assert!(matches!(
        h.apps.set_env(&token, "foo", BTreeMap::new()).await,
        Err(DeployError::Input(_))
    ));
    assert_eq!(h.cluster.calls().apply_deployment, 1);
}

#[tokio::test]
async fn scale_updates_replicas() {
    let h = deployed(FakeCluster::new()).await;
    let token = h.token(ALICE);

    let app = h.apps.set_scale(&token, "foo", 3).await.unwrap();
    assert_eq!(app.scale, 3);
    assert_eq!(h.cluster.deployment("foo", "foo").unwrap().spec.replicas, 3);
    assert_eq!(h.cluster.runtime_pods("foo", "foo").len(), 3);

    assert!(matches!(
        h.apps.set_scale(&token, "foo", 0).await,
        Err(DeployError::Input(_))
    ));
    assert!(matches!(
        h.apps.set_scale(&h.token(BOB), "foo", 2).await,
        Err(DeployError::Auth(_))
    ));
    assert_eq!(h.store.get_app("foo").unwrap().unwrap().scale, 3);
}

#[tokio::test]
async fn settings_before_first_deploy_are_stored_only() {
    let h = harness(FakeCluster::new());
    let token = h.token(ALICE);

    h.apps.set_scale(&token, "foo", 2).await.unwrap();
    assert_eq!(h.cluster.calls().apply_deployment, 0);

    let (mut progress, _) = memory_progress();
    h.deployer
        .deploy(h.request(ALICE, "foo"), &mut progress)
        .await
        .unwrap();
    assert_eq!(h.cluster.deployment("foo", "foo").unwrap().spec.replicas, 2);
}
