//! Condition waiter: poll pods by label until a predicate is satisfied.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::client::{ClusterClient, selector_string};
use crate::error::{ClusterError, ClusterResult};
use crate::pod::{PodPhase, PodState};

/// Poll `list_pods(namespace, selector)` immediately and then every
/// `interval`, evaluating `predicate` against the first match.
///
/// - no match yet counts as "not done" (the pod may not be listed right after
///   creation);
/// - `Ok(true)` returns the pod, `Err(e)` returns `e` at once;
/// - a failing list call is returned as is;
/// - once `timeout` has elapsed the wait ends with [`ClusterError::Timeout`].
///   The last sleep is clamped to the deadline.
pub async fn wait_for_pod<C, F>(
    client: &C,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    interval: Duration,
    timeout: Duration,
    mut predicate: F,
) -> ClusterResult<PodState>
where
    C: ClusterClient + ?Sized,
    F: FnMut(&PodState) -> ClusterResult<bool> + Send,
{
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let pods = client.list_pods(namespace, selector).await?;
        match pods.first() {
            Some(pod) => {
                trace!(pod = %pod.name, phase = %pod.phase, polls, "pod observed");
                if predicate(pod)? {
                    debug!(pod = %pod.name, phase = %pod.phase, polls, "pod condition met");
                    return Ok(pod.clone());
                }
            }
            None => trace!(polls, "no pod matches selector yet"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ClusterError::Timeout {
                what: format!("pod {}", selector_string(selector)),
                timeout,
            });
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Running or already finished. A `Failed` pod aborts the wait.
pub fn pod_started(pod: &PodState) -> ClusterResult<bool> {
    match pod.phase {
        PodPhase::Running | PodPhase::Succeeded => Ok(true),
        PodPhase::Failed => Err(pod_failed(pod)),
        PodPhase::Pending | PodPhase::Unknown => Ok(false),
    }
}

/// Terminal. A `Failed` pod aborts the wait with [`ClusterError::PodFailed`].
pub fn pod_finished(pod: &PodState) -> ClusterResult<bool> {
    match pod.phase {
        PodPhase::Succeeded => Ok(true),
        PodPhase::Failed => Err(pod_failed(pod)),
        _ => Ok(false),
    }
}

fn pod_failed(pod: &PodState) -> ClusterError {
    ClusterError::PodFailed {
        pod: pod.name.clone(),
        message: pod
            .message
            .clone()
            .unwrap_or_else(|| "pod entered the Failed phase".to_string()),
    }
}
