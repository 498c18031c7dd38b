//! slipway.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipwayConfig {
    pub server: ServerConfig,
    pub auth: AuthSection,
    pub storage: StorageSection,
    pub deploy: DeploySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8443".to_string(),
            data_dir: PathBuf::from("/var/lib/slipway"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Ed25519 private key (PKCS#8 PEM) used to sign tokens.
    pub private_key_path: PathBuf,
    /// Matching public key (SPKI PEM) used to verify tokens.
    pub public_key_path: PathBuf,
    pub token_lifetime_secs: u64,
    pub issuer: String,
    pub pepper: Option<String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("keys/slipway.pem"),
            public_key_path: PathBuf::from("keys/slipway.pub.pem"),
            token_lifetime_secs: 14 * 24 * 60 * 60,
            issuer: "slipway".to_string(),
            pepper: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Storage-kind identifier handed to the builder and runner images.
    pub kind: String,
    pub root: PathBuf,
    /// Cluster secret holding the object-store credentials.
    pub secret_name: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: "local".to_string(),
            root: PathBuf::from("/var/lib/slipway/objects"),
            secret_name: "storage-keys".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    pub builder_image: String,
    pub runner_image: String,
    pub poll_interval_ms: u64,
    pub start_timeout_secs: u64,
    pub finish_timeout_secs: u64,
    pub debug: bool,
    pub buildpack_url: Option<String>,
    pub runtime_port: u16,
    pub external_port: u16,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            builder_image: "slipway/slugbuilder:latest".to_string(),
            runner_image: "slipway/slugrunner:latest".to_string(),
            poll_interval_ms: 1000,
            start_timeout_secs: 60,
            finish_timeout_secs: 30 * 60,
            debug: false,
            buildpack_url: None,
            runtime_port: 5000,
            external_port: 80,
        }
    }
}

impl DeploySection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_secs(self.finish_timeout_secs)
    }
}

impl SlipwayConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SlipwayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the redb metadata database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.server.data_dir.join("slipway.redb")
    }
}
