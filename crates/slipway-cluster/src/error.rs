//! Error types for cluster operations.

use std::time::Duration;

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// The API server rejected or failed a request.
    #[error("cluster api error during {operation}: {message}")]
    Api { operation: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    /// A pod reached the platform's terminal `Failed` phase.
    #[error("pod {pod} failed: {message}")]
    PodFailed { pod: String, message: String },

    #[error("log stream error: {0}")]
    LogStream(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn api(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
