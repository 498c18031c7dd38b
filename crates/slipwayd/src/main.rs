//! slipwayd — the Slipway daemon.
//!
//! Serves the REST API and runs deployments against the cluster. The admin
//! subcommands manage users and teams directly in the metadata store.
//!
//! # Usage
//!
//! ```text
//! slipwayd --config /etc/slipway/slipway.toml serve
//! slipwayd user create --email ops@example.com --name Ops --admin
//! slipwayd team create platform
//! slipwayd team add-user platform ops@example.com
//! ```

mod admin;
mod serve;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use slipway_core::SlipwayConfig;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "slipwayd", about = "Slipway daemon")]
struct Cli {
    /// Path to slipway.toml.
    #[arg(long, env = "SLIPWAY_CONFIG", default_value = "slipway.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server.
    Serve {
        /// Override `server.listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Use an in-memory cluster instead of the configured Kubernetes one.
        #[arg(long)]
        fake_cluster: bool,
    },
    /// Print the effective configuration.
    Config,
    /// Manage users.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Manage teams.
    Team {
        #[command(subcommand)]
        command: TeamCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "SLIPWAY_PASSWORD", hide_env_values = true)]
        password: String,
        /// Grant access to every team's apps.
        #[arg(long)]
        admin: bool,
    },
    /// Replace a user's password.
    SetPassword {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SLIPWAY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List users.
    List,
}

#[derive(Subcommand)]
enum TeamCommand {
    /// Create a team.
    Create {
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// List teams with their members.
    List,
    /// Add an existing user to a team.
    AddUser { team: String, email: String },
    /// Remove a user from a team.
    RemoveUser { team: String, email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Serve {
            listen,
            fake_cluster,
        } => serve::run(config, listen, fake_cluster).await,
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::User { command } => {
            let store = admin::open_store(&config)?;
            match command {
                UserCommand::Create {
                    email,
                    name,
                    password,
                    admin,
                } => admin::create_user(&store, &config, &email, &name, &password, admin),
                UserCommand::SetPassword { email, password } => {
                    admin::set_password(&store, &config, &email, &password)
                }
                UserCommand::List => admin::list_users(&store),
            }
        }
        Command::Team { command } => {
            let store = admin::open_store(&config)?;
            match command {
                TeamCommand::Create { name, email, url } => {
                    admin::create_team(&store, &name, email, url)
                }
                TeamCommand::List => admin::list_teams(&store),
                TeamCommand::AddUser { team, email } => admin::add_user(&store, &team, &email),
                TeamCommand::RemoveUser { team, email } => {
                    admin::remove_user(&store, &team, &email)
                }
            }
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,slipwayd=debug,slipway=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A missing file means defaults; a malformed one is an error.
fn load_config(path: &Path) -> anyhow::Result<SlipwayConfig> {
    if path.exists() {
        let config = SlipwayConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(SlipwayConfig::default())
    }
}
