//! slipway-auth — who is calling, and may they touch this team's apps.
//!
//! Tokens are EdDSA-signed JWTs carrying only the subject email. Admin flag
//! and team memberships are loaded from the store on every verification, so
//! membership changes apply on the next request.

pub mod config;
pub mod error;
pub mod identity;
pub mod keys;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use identity::{Identity, TeamRef};
pub use keys::SigningKeys;
pub use service::AuthService;
