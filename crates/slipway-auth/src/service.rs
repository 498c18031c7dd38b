//! Authentication service: login and token verification.

use std::sync::Arc;

use chrono::Utc;
use slipway_state::{StateStore, User};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, TeamRef};
use crate::keys::SigningKeys;
use crate::password;
use crate::token;

#[derive(Clone)]
pub struct AuthService {
    store: StateStore,
    keys: Arc<SigningKeys>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: StateStore, keys: Arc<SigningKeys>, config: AuthConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Check an email/password pair and issue a token.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub fn login(&self, email: &str, password: &str) -> AuthResult<String> {
        let pepper = self.config.pepper.as_deref();
        let Some(user) = self.store.get_user(email)? else {
            password::verify_dummy(password, pepper);
            debug!(%email, "login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify_password(password, &user.password_hash, pepper)? {
            warn!(%email, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.issue_token(&user.email)?;
        debug!(%email, "token issued");
        Ok(token)
    }

    pub fn issue_token(&self, email: &str) -> AuthResult<String> {
        token::issue(&self.keys, &self.config, email, Utc::now())
    }

    /// Verify a token and load the caller's current admin flag and teams.
    pub fn verify(&self, token: &str) -> AuthResult<Identity> {
        let claims = token::decode(&self.keys, &self.config, token)?;
        let Some(user) = self.store.get_user(&claims.sub)? else {
            debug!(email = %claims.sub, "token subject no longer exists");
            return Err(AuthError::InvalidCredentials);
        };
        self.identity_of(&user)
    }

    fn identity_of(&self, user: &User) -> AuthResult<Identity> {
        let teams = self
            .store
            .teams_for_user(&user.email)?
            .iter()
            .map(TeamRef::from)
            .collect();
        Ok(Identity {
            email: user.email.clone(),
            is_admin: user.is_admin,
            teams,
        })
    }

    /// Create a user with a freshly hashed password.
    pub fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        is_admin: bool,
    ) -> AuthResult<User> {
        let user = User {
            email: email.to_string(),
            name: name.to_string(),
            password_hash: password::hash_password(password, self.config.pepper.as_deref())?,
            is_admin,
            created_at: Utc::now(),
        };
        self.store.create_user(&user)?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys::*;
    use slipway_core::TeamName;
    use slipway_state::{StateError, Team};

    fn service() -> AuthService {
        let store = StateStore::open_in_memory().unwrap();
        let keys = SigningKeys::from_pem(PRIVATE_A.as_bytes(), PUBLIC_A.as_bytes()).unwrap();
        let svc = AuthService::new(store, Arc::new(keys), AuthConfig::default());
        svc.create_user("alice@example.com", "Alice", "hunter2", false)
            .unwrap();
        svc
    }

    #[test]
    fn login_and_verify() {
        let svc = service();
        let token = svc.login("alice@example.com", "hunter2").unwrap();
        let identity = svc.verify(&token).unwrap();
        assert_eq!(identity.email, "alice@example.com");
        assert!(!identity.is_admin);
        assert!(identity.teams.is_empty());
    }

    #[test]
    fn bad_logins_are_indistinguishable() {
        let svc = service();
        let wrong_pw = svc.login("alice@example.com", "nope").unwrap_err();
        let no_user = svc.login("bob@example.com", "hunter2").unwrap_err();
        assert!(matches!(wrong_pw, AuthError::InvalidCredentials));
        assert!(matches!(no_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), no_user.to_string());
    }

    #[test]
    fn unknown_user_pays_the_hashing_cost() {
        let svc = service();
        // Warm the fixed hash so only verification is timed.
        let _ = svc.login("nobody@example.com", "x");

        let started = std::time::Instant::now();
        let _ = svc.login("alice@example.com", "nope");
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        let _ = svc.login("bob@example.com", "nope");
        let unknown_user = started.elapsed();

        assert!(
            unknown_user * 10 >= wrong_password,
            "unknown user answered in {unknown_user:?}, wrong password in {wrong_password:?}"
        );
    }

    #[test]
    fn membership_changes_apply_without_new_token() {
        let svc = service();
        let token = svc.login("alice@example.com", "hunter2").unwrap();
        let bar = TeamName::parse("bar").unwrap();
        assert!(svc.verify(&token).unwrap().authorize(&bar).is_err());

        svc.store.create_team(&Team::new(bar.clone())).unwrap();
        svc.store.add_member("bar", "alice@example.com").unwrap();
        let identity = svc.verify(&token).unwrap();
        assert_eq!(identity.teams[0].name, "bar");
        assert!(identity.authorize(&bar).is_ok());

        svc.store.remove_member("bar", "alice@example.com").unwrap();
        assert!(svc.verify(&token).unwrap().authorize(&bar).is_err());
    }

    #[test]
    fn admin_flag_is_loaded_fresh() {
        let svc = service();
        let token = svc.issue_token("alice@example.com").unwrap();
        let mut user = svc.store.get_user("alice@example.com").unwrap().unwrap();
        user.is_admin = true;
        svc.store.put_user(&user).unwrap();
        assert!(svc.verify(&token).unwrap().is_admin);
    }

    #[test]
    fn token_for_deleted_subject_is_rejected() {
        let svc = service();
        let token = svc.issue_token("ghost@example.com").unwrap();
        assert!(matches!(
            svc.verify(&token),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_user_is_a_conflict() {
        let svc = service();
        let err = svc
            .create_user("alice@example.com", "Again", "pw", false)
            .unwrap_err();
        assert!(matches!(err, AuthError::State(StateError::AlreadyExists(_))));
    }
}
