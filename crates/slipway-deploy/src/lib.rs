//! slipway-deploy — turns an uploaded source tarball into a running app.
//!
//! A deployment uploads the tarball to object storage, runs a slug-builder
//! pod, streams its output to the caller, and on success rolls the app's
//! runtime Deployment to the new slug behind a LoadBalancer Service.
//!
//! [`Deployer::prepare`] does everything that may fail before output starts
//! (input validation, token verification, authorization, record creation)
//! so an HTTP layer can still answer with an error status.
//! [`PreparedDeploy::run`] does the rest and reports in-band.

pub mod apps;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod storage;
pub mod stream;
pub mod tail;

pub use apps::{AppService, CreateApp};
pub use config::DeployConfig;
pub use error::{DeployError, DeployResult};
pub use orchestrator::{
    DeployOutcome, DeployRequest, Deployer, ERROR_MARKER, PreparedDeploy, SUCCESS_MARKER,
};
pub use phase::DeployPhase;
pub use storage::{LocalStorage, MemoryStorage, ObjectStorage};
pub use stream::{ChannelSink, MemorySink, ProgressChannel, ProgressSink, WriterSink};
pub use tail::LogTail;
