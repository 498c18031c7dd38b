//! StateStore — redb-backed metadata persistence for Slipway.
//!
//! Typed operations over users, teams, memberships, apps and deployment
//! records. Values are JSON-serialized into redb's `&[u8]` value columns.
//! Both on-disk and in-memory backends are supported (the latter for tests).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [USERS, TEAMS, TEAM_MEMBERS, APPS, DEPLOYMENTS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert only if `key` is absent; the check and write share one transaction.
    fn insert_new<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            if t.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key.to_string()));
            }
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn contains(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        Ok(t.get(key).map_err(map_err!(Read))?.is_some())
    }

    /// All values whose key starts with `prefix` (empty prefix = whole table).
    fn scan<T: DeserializeOwned>(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
            }
        }
        Ok(results)
    }

    // ── Users ──────────────────────────────────────────────────────

    /// Insert a new user. Fails with `AlreadyExists` on a duplicate email.
    pub fn create_user(&self, user: &User) -> StateResult<()> {
        self.insert_new(USERS, &user.email, user)?;
        debug!(email = %user.email, admin = user.is_admin, "user created");
        Ok(())
    }

    /// Insert or update a user.
    pub fn put_user(&self, user: &User) -> StateResult<()> {
        self.put(USERS, &user.email, user)
    }

    pub fn get_user(&self, email: &str) -> StateResult<Option<User>> {
        self.get(USERS, email)
    }

    pub fn list_users(&self) -> StateResult<Vec<User>> {
        self.scan(USERS, "")
    }

    // ── Teams ──────────────────────────────────────────────────────

    /// Insert a new team. Team names are unique.
    pub fn create_team(&self, team: &Team) -> StateResult<()> {
        self.insert_new(TEAMS, team.name.as_str(), team)?;
        debug!(team = %team.name, id = %team.id, "team created");
        Ok(())
    }

    pub fn get_team(&self, name: &str) -> StateResult<Option<Team>> {
        self.get(TEAMS, name)
    }

    pub fn list_teams(&self) -> StateResult<Vec<Team>> {
        self.scan(TEAMS, "")
    }

    // ── Memberships ────────────────────────────────────────────────

    /// Add a user to a team. Both must exist; re-adding is a no-op.
    pub fn add_member(&self, team: &str, email: &str) -> StateResult<()> {
        let team = self
            .get_team(team)?
            .ok_or_else(|| StateError::NotFound(format!("team {team}")))?;
        if !self.contains(USERS, email)? {
            return Err(StateError::NotFound(format!("user {email}")));
        }
        let membership = Membership {
            team: team.name,
            email: email.to_string(),
            added_at: Utc::now(),
        };
        match self.insert_new(TEAM_MEMBERS, &membership.table_key(), &membership) {
            Ok(()) | Err(StateError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        debug!(team = %membership.team, %email, "member added");
        Ok(())
    }

    /// Remove a user from a team. Returns true if the membership existed.
    pub fn remove_member(&self, team: &str, email: &str) -> StateResult<bool> {
        let key = membership_key(team, email);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(TEAM_MEMBERS).map_err(map_err!(Table))?;
            existed = t.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "member removed");
        Ok(existed)
    }

    /// Teams the user currently belongs to.
    pub fn teams_for_user(&self, email: &str) -> StateResult<Vec<Team>> {
        let memberships: Vec<Membership> = self.scan(TEAM_MEMBERS, "")?;
        let mut teams = Vec::new();
        for m in memberships.into_iter().filter(|m| m.email == email) {
            if let Some(team) = self.get_team(m.team.as_str())? {
                teams.push(team);
            }
        }
        Ok(teams)
    }

    pub fn members_of(&self, team: &str) -> StateResult<Vec<String>> {
        let memberships: Vec<Membership> = self.scan(TEAM_MEMBERS, &format!("{team}:"))?;
        Ok(memberships.into_iter().map(|m| m.email).collect())
    }

    // ── Apps ───────────────────────────────────────────────────────

    /// Insert a new app. The owning team must exist and app names are unique.
    pub fn create_app(&self, app: &App) -> StateResult<()> {
        if !self.contains(TEAMS, app.team.as_str())? {
            return Err(StateError::NotFound(format!("team {}", app.team)));
        }
        self.insert_new(APPS, app.name.as_str(), app)?;
        debug!(app = %app.name, team = %app.team, "app created");
        Ok(())
    }

    /// Insert or update an app.
    pub fn put_app(&self, app: &App) -> StateResult<()> {
        self.put(APPS, app.name.as_str(), app)
    }

    pub fn get_app(&self, name: &str) -> StateResult<Option<App>> {
        self.get(APPS, name)
    }

    pub fn list_apps(&self) -> StateResult<Vec<App>> {
        self.scan(APPS, "")
    }

    // ── Deployment records ─────────────────────────────────────────

    pub fn create_deployment(&self, record: &DeploymentRecord) -> StateResult<()> {
        self.insert_new(DEPLOYMENTS, &record.table_key(), record)?;
        debug!(app = %record.app, deploy_id = %record.id, "deployment record created");
        Ok(())
    }

    pub fn get_deployment(&self, app: &str, id: &str) -> StateResult<Option<DeploymentRecord>> {
        self.get(DEPLOYMENTS, &deployment_key(app, id))
    }

    /// Finalize a running record with its outcome. A record is finalized once.
    pub fn finish_deployment(
        &self,
        app: &str,
        id: &str,
        status: DeploymentStatus,
        error: Option<String>,
    ) -> StateResult<DeploymentRecord> {
        let key = deployment_key(app, id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let mut t = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let existing = t
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(format!("deployment {key}")))?;
            let mut record: DeploymentRecord =
                serde_json::from_slice(&existing).map_err(map_err!(Deserialize))?;
            if record.is_finished() {
                return Err(StateError::AlreadyFinalized(key));
            }
            record.status = status;
            record.error = error;
            record.finished_at = Some(Utc::now());
            let bytes = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            t.insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = %record.status, "deployment record finalized");
        Ok(record)
    }

    /// Deployment records for an app, newest first.
    pub fn list_deployments_for_app(&self, app: &str) -> StateResult<Vec<DeploymentRecord>> {
        let mut records: Vec<DeploymentRecord> = self.scan(DEPLOYMENTS, &format!("{app}:"))?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::{AppName, TeamName};

    fn test_user(email: &str, admin: bool) -> User {
        User {
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            is_admin: admin,
            created_at: Utc::now(),
        }
    }

    fn team(name: &str) -> Team {
        Team::new(TeamName::parse(name).unwrap())
    }

    fn app(name: &str, team: &str) -> App {
        App::new(AppName::parse(name).unwrap(), TeamName::parse(team).unwrap())
    }

    fn seeded() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store.create_user(&test_user("alice@example.com", false)).unwrap();
        store.create_team(&team("bar")).unwrap();
        store
    }

    // ── Users ──────────────────────────────────────────────────────

    #[test]
    fn user_create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_user(&test_user("alice@example.com", true)).unwrap();

        let user = store.get_user("alice@example.com").unwrap().unwrap();
        assert!(user.is_admin);
        assert!(store.get_user("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_user_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_user(&test_user("alice@example.com", false)).unwrap();
        let err = store
            .create_user(&test_user("alice@example.com", true))
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));

        // put_user is an upsert.
        store.put_user(&test_user("alice@example.com", true)).unwrap();
        assert!(store.get_user("alice@example.com").unwrap().unwrap().is_admin);
    }

    // ── Teams and memberships ──────────────────────────────────────

    #[test]
    fn duplicate_team_conflicts() {
        let store = seeded();
        let err = store.create_team(&team("bar")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
        assert_eq!(store.list_teams().unwrap().len(), 1);
    }

    #[test]
    fn membership_lookup() {
        let store = seeded();
        store.create_team(&team("baz")).unwrap();
        store.add_member("bar", "alice@example.com").unwrap();
        // Re-adding is idempotent.
        store.add_member("bar", "alice@example.com").unwrap();

        let teams = store.teams_for_user("alice@example.com").unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name.as_str(), "bar");
        assert_eq!(store.members_of("bar").unwrap(), vec!["alice@example.com"]);
        assert!(store.members_of("baz").unwrap().is_empty());

        assert!(store.remove_member("bar", "alice@example.com").unwrap());
        assert!(store.teams_for_user("alice@example.com").unwrap().is_empty());
    }

    #[test]
    fn membership_requires_team_and_user() {
        let store = seeded();
        assert!(matches!(
            store.add_member("nope", "alice@example.com").unwrap_err(),
            StateError::NotFound(_)
        ));
        assert!(matches!(
            store.add_member("bar", "ghost@example.com").unwrap_err(),
            StateError::NotFound(_)
        ));
    }

    // ── Apps ───────────────────────────────────────────────────────

    #[test]
    fn app_create_requires_team() {
        let store = seeded();
        store.create_app(&app("foo", "bar")).unwrap();
        assert_eq!(store.get_app("foo").unwrap().unwrap().team.as_str(), "bar");

        assert!(matches!(
            store.create_app(&app("orphan", "missing")).unwrap_err(),
            StateError::NotFound(_)
        ));
        assert!(matches!(
            store.create_app(&app("foo", "bar")).unwrap_err(),
            StateError::AlreadyExists(_)
        ));
    }

    #[test]
    fn app_update() {
        let store = seeded();
        let mut foo = app("foo", "bar");
        store.create_app(&foo).unwrap();
        foo.scale = 3;
        foo.env.insert("LOG_LEVEL".into(), "debug".into());
        store.put_app(&foo).unwrap();

        let loaded = store.get_app("foo").unwrap().unwrap();
        assert_eq!(loaded.scale, 3);
        assert_eq!(loaded.env["LOG_LEVEL"], "debug");
        assert_eq!(store.list_apps().unwrap().len(), 1);
    }

    // ── Deployment records ─────────────────────────────────────────

    #[test]
    fn deployment_lifecycle() {
        let store = seeded();
        let record = DeploymentRecord::start(
            AppName::parse("foo").unwrap(),
            "first push",
            DeployOrigin::Upload,
        );
        store.create_deployment(&record).unwrap();

        let finished = store
            .finish_deployment("foo", &record.id, DeploymentStatus::Succeeded, None)
            .unwrap();
        assert_eq!(finished.status, DeploymentStatus::Succeeded);
        assert!(finished.finished_at.is_some());

        // Finalized exactly once.
        let err = store
            .finish_deployment("foo", &record.id, DeploymentStatus::Failed, None)
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyFinalized(_)));
        let stored = store.get_deployment("foo", &record.id).unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Succeeded);
    }

    #[test]
    fn finish_unknown_deployment() {
        let store = seeded();
        let err = store
            .finish_deployment("foo", "nope", DeploymentStatus::Failed, None)
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn deployment_list_for_app() {
        let store = seeded();
        let foo = AppName::parse("foo").unwrap();
        let foobar = AppName::parse("foobar").unwrap();

        let mut older = DeploymentRecord::start(foo.clone(), "v1", DeployOrigin::Upload);
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = DeploymentRecord::start(foo, "v2", DeployOrigin::Automated);
        let other = DeploymentRecord::start(foobar, "x", DeployOrigin::Upload);
        for r in [&older, &newer, &other] {
            store.create_deployment(r).unwrap();
        }

        // "foo:" must not match "foobar:" keys.
        let list = store.list_deployments_for_app("foo").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].description, "v2");
        assert_eq!(list[1].description, "v1");
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.create_user(&test_user("alice@example.com", false)).unwrap();
            store.create_team(&team("bar")).unwrap();
            store.create_app(&app("foo", "bar")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_user("alice@example.com").unwrap().is_some());
        assert_eq!(store.get_app("foo").unwrap().unwrap().name.as_str(), "foo");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_users().unwrap().is_empty());
        assert!(store.list_teams().unwrap().is_empty());
        assert!(store.list_apps().unwrap().is_empty());
        assert!(store.teams_for_user("any").unwrap().is_empty());
        assert!(store.list_deployments_for_app("any").unwrap().is_empty());
        assert!(!store.remove_member("any", "any").unwrap());
    }
}
