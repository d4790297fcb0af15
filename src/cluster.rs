//! Cluster resource client interface
//!
//! The orchestrator never talks to the API server directly. It goes through
//! [`ClusterClient`], implemented for real by [`crate::oc::OcCli`] and by an
//! in-memory fake in tests.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::manifest::LabelSelector;

/// Errors from the cluster resource API
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("cluster API error: {0}")]
    Api(String),

    #[error("failed to run cluster client: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to decode cluster response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Kinds of object making up the resource set, plus pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ImageStream,
    PersistentVolumeClaim,
    DeploymentConfig,
    Service,
    Route,
    Pod,
}

impl ResourceKind {
    /// Resource name understood by `oc get`/`oc create`
    pub fn api_name(&self) -> &'static str {
        match self {
            ResourceKind::ImageStream => "imagestream",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaim",
            ResourceKind::DeploymentConfig => "deploymentconfig",
            ResourceKind::Service => "service",
            ResourceKind::Route => "route",
            ResourceKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// An object to create: its kind, name and full JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind: ResourceKind,
    pub name: String,
    pub body: Value,
}

/// Extract `metadata.labels` from an object
pub fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create an object and return it as stored by the cluster.
    ///
    /// Fails with [`ClusterError::AlreadyExists`] when an object of the same
    /// kind and name is already present.
    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Value, ClusterError>;

    /// Fetch one object.
    async fn get(&self, namespace: &str, kind: ResourceKind, name: &str)
        -> Result<Value, ClusterError>;

    /// List the pods carrying every label of `selector`.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, ClusterError>;
}

/// Phase of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown(String),
}

impl PodPhase {
    fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            Some(other) => PodPhase::Unknown(other.to_string()),
            None => PodPhase::Unknown(String::new()),
        }
    }

    /// Check if the pod is running
    pub fn is_running(&self) -> bool {
        matches!(self, PodPhase::Running)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodPhase::Pending => f.write_str("Pending"),
            PodPhase::Running => f.write_str("Running"),
            PodPhase::Succeeded => f.write_str("Succeeded"),
            PodPhase::Failed => f.write_str("Failed"),
            PodPhase::Unknown(s) if s.is_empty() => f.write_str("Unknown"),
            PodPhase::Unknown(s) => f.write_str(s),
        }
    }
}

/// List response for pods
#[derive(Debug, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

/// The subset of a pod object the watcher looks at
#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadata {
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub waiting: Option<ContainerStateWaiting>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStateWaiting {
    #[serde(default)]
    pub reason: Option<String>,
}

impl Pod {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn phase(&self) -> PodPhase {
        PodPhase::parse(self.status.phase.as_deref())
    }

    /// Number of ready containers and total containers
    pub fn ready_count(&self) -> (usize, usize) {
        let statuses = &self.status.container_statuses;
        (statuses.iter().filter(|c| c.ready).count(), statuses.len())
    }

    /// Running, not being deleted, and every container reports ready.
    pub fn is_ready(&self) -> bool {
        let (ready, total) = self.ready_count();
        self.phase().is_running()
            && self.metadata.deletion_timestamp.is_none()
            && total > 0
            && ready == total
    }

    /// Short state for logs: the phase, or a container's waiting reason
    /// such as `CrashLoopBackOff` or `ContainerCreating`.
    pub fn describe(&self) -> String {
        let waiting = self.status.container_statuses.iter().find_map(|c| {
            c.state
                .as_ref()
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.reason.as_deref())
                .map(|reason| (c.name.as_str(), reason))
        });
        let (ready, total) = self.ready_count();
        match waiting {
            Some((container, reason)) => format!("{} ({}: {})", self.phase(), container, reason),
            None => format!("{} ({}/{} ready)", self.phase(), ready, total),
        }
    }
}
