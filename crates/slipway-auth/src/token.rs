//! EdDSA JWT issuance and verification.
//!
//! The signed claims are deliberately minimal: subject email, issuer and
//! validity window. Everything used for authorization is loaded fresh.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::SigningKeys;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject email.
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a token for `email`, valid from `now` for the configured lifetime.
pub fn issue(
    keys: &SigningKeys,
    config: &AuthConfig,
    email: &str,
    now: DateTime<Utc>,
) -> AuthResult<String> {
    let iat = now.timestamp();
    let claims = Claims {
        sub: email.to_string(),
        iss: config.issuer.clone(),
        iat,
        exp: iat + config.token_lifetime_secs as i64,
    };
    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &keys.encoding)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Check signature, issuer and expiry.
///
/// Expiry is reported as [`AuthError::TokenExpired`]; every other failure
/// collapses to [`AuthError::InvalidCredentials`].
pub fn decode(keys: &SigningKeys, config: &AuthConfig, token: &str) -> AuthResult<Claims> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

    jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidCredentials,
        })
}
