//! slipway-cluster — the narrow slice of the Kubernetes API Slipway needs.
//!
//! [`ClusterClient`] is the capability seam: create, inspect, list and tail
//! pods, and create-or-update the runtime Deployment and Service. It carries
//! no retry logic. [`KubeClusterClient`] is the kube-rs adapter and
//! [`FakeCluster`] an in-memory double with scripted pod progressions.
//!
//! [`wait_for_pod`] polls the facade until a predicate over the observed pod
//! state is satisfied, fails, or times out.

pub mod client;
pub mod error;
pub mod fake;
pub mod k8s;
pub mod pod;
pub mod wait;

pub use client::{Applied, ClusterClient, LogStream, selector_string};
pub use error::{ClusterError, ClusterResult};
pub use fake::{BuildScript, CallCounts, FakeCluster};
pub use k8s::KubeClusterClient;
pub use pod::{ContainerExit, PodPhase, PodState};
pub use wait::{pod_finished, pod_started, wait_for_pod};
