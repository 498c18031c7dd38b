pub mod config;
pub mod error;
pub mod names;
pub mod types;

pub use config::SlipwayConfig;
pub use error::{CoreError, CoreResult};
pub use names::{AppName, MAX_APP_NAME_LEN, TeamName, short_revision};
pub use types::*;
