//! slipway-api — REST API for Slipway.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/login` | Exchange email and password for a token |
//! | GET | `/api/v1/apps` | Apps visible to the caller |
//! | POST | `/api/v1/apps` | Create an app for a team |
//! | GET | `/api/v1/apps/{app}` | Get app details |
//! | GET | `/api/v1/apps/{app}/logs?lines=N` | Recent output of the running pods |
//! | PUT | `/api/v1/apps/{app}/env` | Set environment variables |
//! | DELETE | `/api/v1/apps/{app}/env?keys=A,B` | Unset environment variables |
//! | PUT | `/api/v1/apps/{app}/scale` | Change the replica count |
//! | GET | `/api/v1/apps/{app}/deployments` | Deployment history, newest first |
//! | POST | `/api/v1/apps/{app}/deployments` | Deploy a source tarball, streaming progress |
//!
//! Everything but login takes `Authorization: Bearer <token>`.

pub mod handlers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use slipway_auth::AuthService;
use slipway_deploy::{AppService, Deployer};

/// Largest source tarball accepted by the deploy endpoint.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub auth: AuthService,
    pub apps: AppService,
    pub deployer: Deployer,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/apps", get(handlers::list_apps).post(handlers::create_app))
        .route("/apps/{app}", get(handlers::get_app))
        .route("/apps/{app}/logs", get(handlers::app_logs))
        .route(
            "/apps/{app}/env",
            put(handlers::set_env).delete(handlers::unset_env),
        )
        .route("/apps/{app}/scale", put(handlers::set_scale))
        .route(
            "/apps/{app}/deployments",
            get(handlers::list_deployments)
                .post(handlers::create_deployment)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
