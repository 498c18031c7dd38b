//! Admin subcommands working directly on the metadata store.

use chrono::Utc;
use slipway_auth::password;
use slipway_core::{SlipwayConfig, TeamName};
use slipway_state::{StateStore, Team, User};
use tracing::info;

pub fn open_store(config: &SlipwayConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.server.data_dir)?;
    let path = config.database_path();
    let store = StateStore::open(&path)?;
    info!(path = %path.display(), "state store opened");
    Ok(store)
}

pub fn create_user(
    store: &StateStore,
    config: &SlipwayConfig,
    email: &str,
    name: &str,
    password: &str,
    is_admin: bool,
) -> anyhow::Result<()> {
    if !email.contains('@') {
        anyhow::bail!("{email:?} is not an email address");
    }
    let user = User {
        email: email.to_string(),
        name: name.to_string(),
        password_hash: password::hash_password(password, config.auth.pepper.as_deref())?,
        is_admin,
        created_at: Utc::now(),
    };
    store.create_user(&user)?;
    info!(%email, admin = is_admin, "user created");
    Ok(())
}

pub fn set_password(
    store: &StateStore,
    config: &SlipwayConfig,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let Some(mut user) = store.get_user(email)? else {
        anyhow::bail!("no user {email}");
    };
    user.password_hash = password::hash_password(password, config.auth.pepper.as_deref())?;
    store.put_user(&user)?;
    info!(%email, "password changed");
    Ok(())
}

pub fn list_users(store: &StateStore) -> anyhow::Result<()> {
    for user in store.list_users()? {
        let teams: Vec<String> = store
            .teams_for_user(&user.email)?
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        println!(
            "{}\t{}\t{}\t{}",
            user.email,
            user.name,
            if user.is_admin { "admin" } else { "-" },
            teams.join(",")
        );
    }
    Ok(())
}

pub fn create_team(
    store: &StateStore,
    name: &str,
    email: Option<String>,
    url: Option<String>,
) -> anyhow::Result<()> {
    let mut team = Team::new(TeamName::parse(name)?);
    team.email = email;
    team.url = url;
    store.create_team(&team)?;
    info!(team = %team.name, id = %team.id, "team created");
    Ok(())
}

pub fn list_teams(store: &StateStore) -> anyhow::Result<()> {
    for team in store.list_teams()? {
        let members = store.members_of(team.name.as_str())?;
        println!(
            "{}\t{}\t{}\t{}",
            team.name,
            team.email.as_deref().unwrap_or("-"),
            team.url.as_deref().unwrap_or("-"),
            members.join(",")
        );
    }
    Ok(())
}

pub fn add_user(store: &StateStore, team: &str, email: &str) -> anyhow::Result<()> {
    store.add_member(team, email)?;
    info!(%team, %email, "user added to team");
    Ok(())
}

pub fn remove_user(store: &StateStore, team: &str, email: &str) -> anyhow::Result<()> {
    if store.remove_member(team, email)? {
        info!(%team, %email, "user removed from team");
    } else {
        info!(%team, %email, "user was not a member");
    }
    Ok(())
}
