//! Ed25519 signing key pair, loaded once at startup.

use std::path::Path;

use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::error::{AuthError, AuthResult};

/// Process-wide token keys. Immutable after load; share behind an `Arc`.
#[derive(Clone)]
pub struct SigningKeys {
    pub(crate) encoding: EncodingKey,
    pub(crate) decoding: DecodingKey,
}

impl SigningKeys {
    /// Parse a PKCS#8 private key and SPKI public key, both PEM.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> AuthResult<Self> {
        let encoding = EncodingKey::from_ed_pem(private_pem)
            .map_err(|e| AuthError::Key(format!("bad private key: {e}")))?;
        let decoding = DecodingKey::from_ed_pem(public_pem)
            .map_err(|e| AuthError::Key(format!("bad public key: {e}")))?;
        Ok(Self { encoding, decoding })
    }

    pub fn load(private_path: &Path, public_path: &Path) -> AuthResult<Self> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| AuthError::Key(format!("cannot read {}: {e}", path.display())))
        };
        Self::from_pem(&read(private_path)?, &read(public_path)?)
    }
}
