//! Verified caller identity and the team authorization rule.

use serde::{Deserialize, Serialize};
use slipway_core::TeamName;
use slipway_state::Team;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

impl From<&Team> for TeamRef {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.to_string(),
        }
    }
}

/// A verified caller with attributes loaded at verification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub is_admin: bool,
    pub teams: Vec<TeamRef>,
}

impl Identity {
    pub fn is_member(&self, team: &TeamName) -> bool {
        self.teams.iter().any(|t| t.name == team.as_str())
    }

    /// Admins may act on any team; everyone else only on their own teams.
    pub fn authorize(&self, team: &TeamName) -> AuthResult<()> {
        if self.is_admin || self.is_member(team) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                team: team.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(admin: bool, teams: &[&str]) -> Identity {
        Identity {
            email: "alice@example.com".into(),
            is_admin: admin,
            teams: teams
                .iter()
                .map(|t| TeamRef {
                    id: format!("id-{t}"),
                    name: t.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn member_is_authorized() {
        let bar = TeamName::parse("bar").unwrap();
        assert!(identity(false, &["bar"]).authorize(&bar).is_ok());
    }

    #[test]
    fn non_member_is_forbidden() {
        let bar = TeamName::parse("bar").unwrap();
        for teams in [&[][..], &["baz"][..], &["barn", "ba"][..]] {
            let err = identity(false, teams).authorize(&bar).unwrap_err();
            assert!(matches!(err, AuthError::Forbidden { .. }));
        }
    }

    #[test]
    fn admin_bypasses_membership() {
        let bar = TeamName::parse("bar").unwrap();
        assert!(identity(true, &[]).authorize(&bar).is_ok());
    }
}
