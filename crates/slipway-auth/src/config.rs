//! Authentication configuration.

use slipway_core::config::AuthSection;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token lifetime in seconds (default: 1_209_600 = two weeks).
    pub token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub issuer: String,
    /// Optional pepper prepended to passwords before hashing.
    pub pepper: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from(&AuthSection::default())
    }
}

impl From<&AuthSection> for AuthConfig {
    fn from(section: &AuthSection) -> Self {
        Self {
            token_lifetime_secs: section.token_lifetime_secs,
            issuer: section.issuer.clone(),
            pepper: section.pepper.clone(),
        }
    }
}
