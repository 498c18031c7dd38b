//! Deployment error taxonomy.
//!
//! Every variant has a caller-facing message that never carries platform
//! detail; the full error is logged where it happens.

use slipway_auth::AuthError;
use slipway_cluster::ClusterError;
use slipway_core::CoreError;
use slipway_state::StateError;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Malformed request: bad name, missing field, empty upload.
    #[error("invalid request: {0}")]
    Input(String),

    /// Bad credentials, expired token or insufficient team access.
    #[error(transparent)]
    Auth(AuthError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    /// The cluster, store or object storage failed.
    #[error("platform error: {0}")]
    Platform(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// The build ran and failed. A deployment outcome, not a system error.
    #[error("build failed: {message}")]
    BuildFailed {
        message: String,
        log_tail: Vec<String>,
    },
}

impl DeployError {
    /// Text safe to show the caller.
    pub fn caller_message(&self) -> String {
        match self {
            DeployError::Input(msg) => format!("invalid request: {msg}"),
            DeployError::Auth(e) => e.to_string(),
            DeployError::NotFound(what) => format!("{what} not found"),
            DeployError::Conflict(what) => format!("{what} already exists"),
            DeployError::Platform(_) => "internal platform error".to_string(),
            DeployError::Timeout(_) => "timed out waiting for the cluster".to_string(),
            DeployError::BuildFailed { message, .. } => message.clone(),
        }
    }

    /// Text persisted on the deployment record.
    pub fn record_text(&self) -> String {
        match self {
            DeployError::BuildFailed { message, log_tail } if !log_tail.is_empty() => {
                format!("{message}\n{}", log_tail.join("\n"))
            }
            other => other.caller_message(),
        }
    }

    pub fn is_build_failure(&self) -> bool {
        matches!(self, DeployError::BuildFailed { .. })
    }
}

impl From<AuthError> for DeployError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::State(e) => e.into(),
            AuthError::Key(msg) | AuthError::Crypto(msg) => DeployError::Platform(msg),
            other => DeployError::Auth(other),
        }
    }
}

impl From<StateError> for DeployError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::AlreadyExists(what) => DeployError::Conflict(what),
            StateError::NotFound(what) => DeployError::NotFound(what),
            other => DeployError::Platform(other.to_string()),
        }
    }
}

impl From<CoreError> for DeployError {
    fn from(err: CoreError) -> Self {
        DeployError::Input(err.to_string())
    }
}

impl From<ClusterError> for DeployError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Timeout { .. } => DeployError::Timeout(err.to_string()),
            ClusterError::PodFailed { message, .. } => DeployError::BuildFailed {
                message: format!("build pod failed: {message}"),
                log_tail: Vec::new(),
            },
            other => DeployError::Platform(other.to_string()),
        }
    }
}
