//! Errors for input validation and config parsing.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid rolling update bound {0:?}")]
    InvalidBound(String),

    #[error("config error: {0}")]
    Config(String),
}
