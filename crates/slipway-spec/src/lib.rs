//! slipway-spec — pure construction of the Kubernetes manifests Slipway
//! submits for every deployment.
//!
//! - [`build_pod`]: the ephemeral slug-builder Pod
//! - [`runtime_deployment`]: the long-running, rolling-updated slug runner
//! - [`exposure_service`]: the LoadBalancer Service in front of it
//!
//! Nothing here performs I/O. Precondition violations are programmer errors
//! and are checked with `debug_assert!`.

pub mod builder;
pub mod manifest;

pub use builder::{
    SpecContext, StorageBinding, build_pod, build_pod_name, exposure_service, runtime_deployment,
};
pub use manifest::*;
pub use slipway_core::IntOrPercent;
