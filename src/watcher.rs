//! Waiting for the development pod to become ready
//!
//! The watcher polls the pods selected by the application's label pair
//! until one is running with every container ready. Rollouts leave
//! transient pods behind, so several may match; the newest ready one wins.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterClient, ClusterError, Pod, ResourceKind};
use crate::error::DevError;
use crate::manifest::{ApplicationDescriptor, LabelSelector};
use crate::resources::desired_replicas;

/// The pod a command runs against. Only valid for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    pub name: String,
    pub namespace: String,
}

/// The newest ready pod among `pods`, if any.
///
/// Pods being deleted never qualify.
pub fn pick_ready(pods: &[Pod]) -> Option<&Pod> {
    pods.iter()
        .filter(|p| p.is_ready())
        .max_by_key(|p| p.metadata.creation_timestamp)
}

pub struct PodReadinessWatcher<'a, C: ClusterClient> {
    client: &'a C,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a, C: ClusterClient> PodReadinessWatcher<'a, C> {
    pub fn new(client: &'a C, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            timeout,
            poll_interval,
        }
    }

    /// Block until a ready pod for `app` exists, the timeout expires or
    /// `cancel` fires.
    pub async fn wait_for_pod(
        &self,
        app: &ApplicationDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PodHandle, DevError> {
        self.check_replicas(app).await?;

        let selector = app.selector();
        let deadline = Instant::now() + self.timeout;
        let mut last_seen = String::new();

        tracing::info!("Waiting for a ready pod matching {}", selector);
        loop {
            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DevError::Cancelled),
                r = tokio::time::timeout_at(deadline, self.client.list_pods(app.namespace(), &selector)) => r,
            };
            let pods = match listed {
                Ok(pods) => pods?,
                Err(_) => return Err(self.timeout_error(&selector)),
            };

            let ready = pods.iter().filter(|p| p.is_ready()).count();
            if let Some(pod) = pick_ready(&pods) {
                if ready > 1 {
                    tracing::warn!(
                        "{} pods matching {} are ready at once, using the newest ({})",
                        ready,
                        selector,
                        pod.name()
                    );
                }
                tracing::info!("Pod {} is ready", pod.name());
                return Ok(PodHandle {
                    name: pod.name().to_string(),
                    namespace: app.namespace().to_string(),
                });
            }

            let seen = summarize(&pods);
            if seen != last_seen {
                tracing::info!("Not ready yet: {}", seen);
                last_seen = seen;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout_error(&selector));
            }
            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DevError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Fail fast when the deployment config will never produce a pod.
    async fn check_replicas(&self, app: &ApplicationDescriptor) -> Result<(), DevError> {
        let dc = match self
            .client
            .get(app.namespace(), ResourceKind::DeploymentConfig, app.name())
            .await
        {
            Ok(dc) => dc,
            Err(ClusterError::NotFound { .. }) => {
                return Err(DevError::config(format!(
                    "deployment config {} not found in namespace {}; run `sb init` first",
                    app.name(),
                    app.namespace()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let replicas = desired_replicas(&dc).map_err(ClusterError::from)?;
        if replicas == Some(0) {
            return Err(DevError::NoReplicas {
                name: app.name().to_string(),
            });
        }
        Ok(())
    }

    fn timeout_error(&self, selector: &LabelSelector) -> DevError {
        DevError::PodWatchTimeout {
            selector: selector.to_string(),
            timeout: self.timeout,
        }
    }
}

fn summarize(pods: &[Pod]) -> String {
    if pods.is_empty() {
        return "no pods yet".to_string();
    }
    pods.iter()
        .map(|p| format!("{} {}", p.name(), p.describe()))
        .collect::<Vec<_>>()
        .join(", ")
}
