//! REST API handlers.
//!
//! JSON endpoints answer with an `ApiResponse` envelope. The deploy endpoint
//! answers `text/plain` and streams build progress as it happens; it only
//! returns an error status when the request is rejected before the build
//! starts.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use slipway_auth::AuthError;
use slipway_deploy::{ChannelSink, CreateApp, DeployError, DeployRequest, ProgressChannel};
use slipway_state::DeployOrigin;
use tracing::{debug, error, info};

use crate::ApiState;

/// Chunks buffered between a running deployment and its response body.
const PROGRESS_BUFFER: usize = 64;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn status_for(err: &DeployError) -> StatusCode {
    match err {
        DeployError::Input(_) => StatusCode::BAD_REQUEST,
        DeployError::Auth(AuthError::Forbidden { .. }) => StatusCode::FORBIDDEN,
        DeployError::Auth(_) => StatusCode::UNAUTHORIZED,
        DeployError::NotFound(_) => StatusCode::NOT_FOUND,
        DeployError::Conflict(_) => StatusCode::CONFLICT,
        DeployError::Platform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DeployError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DeployError::BuildFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn deploy_error(err: DeployError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    } else {
        debug!(error = %err, %status, "request rejected");
    }
    error_response(&err.caller_message(), status)
}

/// Token from `Authorization: Bearer <token>`.
fn bearer(headers: &HeaderMap) -> Result<&str, Response> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| error_response("missing bearer token", StatusCode::UNAUTHORIZED))
}

// ── Login ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// POST /api/v1/login
pub async fn login(State(state): State<ApiState>, Json(req): Json<LoginRequest>) -> Response {
    let auth = state.auth.clone();
    // Password hashing is CPU-bound.
    match tokio::task::spawn_blocking(move || auth.login(&req.email, &req.password)).await {
        Ok(Ok(token)) => ApiResponse::ok(LoginResponse { token }).into_response(),
        Ok(Err(e)) => deploy_error(e.into()),
        Err(e) => {
            error!(error = %e, "login task failed");
            error_response("internal platform error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Apps ───────────────────────────────────────────────────────

/// GET /api/v1/apps
pub async fn list_apps(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.list_apps(token) {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => deploy_error(e),
    }
}

/// POST /api/v1/apps
pub async fn create_app(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<CreateApp>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.create_app(token, req).await {
        Ok(app) => (StatusCode::CREATED, ApiResponse::ok(app)).into_response(),
        Err(e) => deploy_error(e),
    }
}

/// GET /api/v1/apps/{app}
pub async fn get_app(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.get_app(token, &app) {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => deploy_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub lines: Option<i64>,
}

/// GET /api/v1/apps/{app}/logs?lines=N
pub async fn app_logs(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    Query(query): Query<LogsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.app_logs(token, &app, query.lines).await {
        Ok(logs) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            logs,
        )
            .into_response(),
        Err(e) => deploy_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetEnvRequest {
    pub env: BTreeMap<String, String>,
}

/// PUT /api/v1/apps/{app}/env
pub async fn set_env(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetEnvRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.set_env(token, &app, req.env).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => deploy_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UnsetEnvQuery {
    /// Comma-separated variable names.
    #[serde(default)]
    pub keys: String,
}

/// DELETE /api/v1/apps/{app}/env?keys=A,B
pub async fn unset_env(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    Query(query): Query<UnsetEnvQuery>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let keys: Vec<String> = query
        .keys
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    match state.apps.unset_env(token, &app, &keys).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => deploy_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub scale: u32,
}

/// PUT /api/v1/apps/{app}/scale
pub async fn set_scale(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ScaleRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.set_scale(token, &app, req.scale).await {
        Ok(app) => ApiResponse::ok(app).into_response(),
        Err(e) => deploy_error(e),
    }
}

// ── Deployments ────────────────────────────────────────────────

/// GET /api/v1/apps/{app}/deployments
pub async fn list_deployments(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match state.apps.list_deployments(token, &app) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => deploy_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeployQuery {
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /api/v1/apps/{app}/deployments?description=...
///
/// The body is the gzipped source tarball.
pub async fn create_deployment(
    State(state): State<ApiState>,
    Path(app): Path<String>,
    Query(query): Query<DeployQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    let request = DeployRequest {
        token: token.to_string(),
        app,
        description: query
            .description
            .unwrap_or_else(|| "deploy from upload".to_string()),
        origin: DeployOrigin::Upload,
        tarball: body,
    };
    let prepared = match state.deployer.prepare(request) {
        Ok(prepared) => prepared,
        Err(e) => return deploy_error(e),
    };

    let (sink, rx) = ChannelSink::pair(PROGRESS_BUFFER);
    let deploy_id = prepared.record().id.clone();
    tokio::spawn(async move {
        let mut progress = ProgressChannel::new(sink);
        let outcome = prepared.run(&mut progress).await;
        info!(
            deploy_id = %outcome.record.id,
            status = %outcome.record.status,
            streamed = progress.bytes_written(),
            "deploy request finished"
        );
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::HeaderName::from_static("x-deploy-id"), deploy_id),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
