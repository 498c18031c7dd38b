//! slipway-state — metadata store for Slipway.
//!
//! Backed by [redb](https://docs.rs/redb). Holds users, teams, team
//! memberships, apps and deployment records.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{team}:{email}`, `{app}:{deploy_id}`) allow prefix scans
//! for related records. Unique-key violations surface as
//! [`StateError::AlreadyExists`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
