//! Validated app and team names.
//!
//! App names double as Kubernetes namespace, Deployment, Service and label
//! values, so they must be DNS-1123 labels. Team names are looser but still
//! end up in log fields and storage keys.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Longest app name whose build pod name (`slugbuild-<app>-<rev>-<suffix>`)
/// still fits a 63-character label value.
pub const MAX_APP_NAME_LEN: usize = 36;
const MAX_TEAM_NAME_LEN: usize = 64;

fn dns_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static regex"))
}

fn invalid(name: &str, reason: &str) -> CoreError {
    CoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// A DNS-1123 label naming an app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppName(String);

impl AppName {
    pub fn parse(name: &str) -> CoreResult<Self> {
        if name.is_empty() {
            return Err(invalid(name, "must not be empty"));
        }
        if name.len() > MAX_APP_NAME_LEN {
            return Err(invalid(name, "too long"));
        }
        if !dns_label().is_match(name) {
            return Err(invalid(
                name,
                "must contain only lowercase letters, digits and '-', and start and end with an alphanumeric",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AppName> for String {
    fn from(value: AppName) -> Self {
        value.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A team name: non-empty, trimmed, no control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TeamName(String);

impl TeamName {
    pub fn parse(name: &str) -> CoreResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(invalid(name, "must not be empty"));
        }
        if trimmed.len() > MAX_TEAM_NAME_LEN {
            return Err(invalid(name, "too long"));
        }
        if trimmed.chars().any(|c| c.is_control() || c == ':' || c == '/') {
            return Err(invalid(name, "contains a reserved character"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TeamName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TeamName> for String {
    fn from(value: TeamName) -> Self {
        value.0
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short content hash of a source archive: first 7 hex chars of its SHA-256.
pub fn short_revision(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut rev = hex::encode(digest);
    rev.truncate(7);
    rev
}
