//! redb table definitions for the Slipway metadata store.
//!
//! Every table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Users keyed by `{email}`.
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Teams keyed by `{team_name}`.
pub const TEAMS: TableDefinition<&str, &[u8]> = TableDefinition::new("teams");

/// Memberships keyed by `{team_name}:{email}`.
pub const TEAM_MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("team_members");

/// Apps keyed by `{app_name}`.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");

/// Deployment records keyed by `{app_name}:{deploy_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Shape shared by every table above.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
