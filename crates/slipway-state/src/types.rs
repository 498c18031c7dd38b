//! Records persisted in the metadata store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slipway_core::{AppName, RollingUpdate, TeamName};

/// A platform user. `password_hash` is an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// A tenancy boundary owning zero or more apps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: TeamName,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: TeamName) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email: None,
            url: None,
            created_at: Utc::now(),
        }
    }
}

/// Team membership row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub team: TeamName,
    pub email: String,
    pub added_at: DateTime<Utc>,
}

impl Membership {
    pub fn table_key(&self) -> String {
        membership_key(self.team.as_str(), &self.email)
    }
}

pub(crate) fn membership_key(team: &str, email: &str) -> String {
    format!("{team}:{email}")
}

/// A deployable unit owned by exactly one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: AppName,
    pub team: TeamName,
    pub scale: u32,
    #[serde(default)]
    pub rolling_update: RollingUpdate,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl App {
    pub fn new(name: AppName, team: TeamName) -> Self {
        Self {
            name,
            team,
            scale: 1,
            rolling_update: RollingUpdate::default(),
            env: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// How a deployment was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployOrigin {
    Upload,
    Automated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Succeeded => write!(f, "succeeded"),
            DeploymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt to build and roll out an app.
///
/// Created as `Running` before any cluster work starts and finalized exactly
/// once with the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub app: AppName,
    pub description: String,
    pub origin: DeployOrigin,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    pub fn start(app: AppName, description: impl Into<String>, origin: DeployOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            app,
            description: description.into(),
            origin,
            status: DeploymentStatus::Running,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn table_key(&self) -> String {
        deployment_key(self.app.as_str(), &self.id)
    }

    pub fn is_finished(&self) -> bool {
        self.status != DeploymentStatus::Running
    }
}

pub(crate) fn deployment_key(app: &str, id: &str) -> String {
    format!("{app}:{id}")
}
