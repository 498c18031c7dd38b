//! Authentication and authorization errors.

use slipway_state::StateError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, wrong password, or a token that fails verification for
    /// any reason other than expiry.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token has expired")]
    TokenExpired,

    #[error("not a member of team {team}")]
    Forbidden { team: String },

    #[error("key error: {0}")]
    Key(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error(transparent)]
    State(#[from] StateError),
}
