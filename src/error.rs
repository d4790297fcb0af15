//! Typed errors for the development pod lifecycle.
//!
//! `DevError` is what every component returns. The orchestrator wraps it in a
//! `FlowError` naming the [`Stage`] it came from, so callers can tell a bad
//! manifest from a pod that never became ready without parsing messages.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cluster::{ClusterError, ResourceKind};
use crate::remote::ExecError;

/// Errors raised by the provisioner, the watcher and the dispatcher.
#[derive(Debug, Error)]
pub enum DevError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to create {kind} {name}: {source}")]
    ResourceCreation {
        kind: ResourceKind,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("no ready pod matching {selector} within {}s", .timeout.as_secs())]
    PodWatchTimeout { selector: String, timeout: Duration },

    #[error("deployment config {name} is scaled to zero replicas")]
    NoReplicas { name: String },

    #[error("remote step '{step}' failed: {source}")]
    RemoteExec {
        step: String,
        #[source]
        source: ExecError,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("cancelled")]
    Cancelled,
}

impl DevError {
    pub fn config(msg: impl Into<String>) -> Self {
        DevError::Configuration(msg.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DevError::Configuration(_) => 2,
            DevError::PodWatchTimeout { .. } => 3,
            DevError::NoReplicas { .. } => 4,
            DevError::ResourceCreation { .. } => 5,
            DevError::RemoteExec { .. } => 6,
            DevError::Cancelled => 130,
            DevError::Cluster(_) => 1,
        }
    }
}

/// Named stages of a flow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading and validating the application descriptor
    Descriptor,
    /// Creating the resource set
    Provision,
    /// Waiting for a ready pod
    WaitForPod,
    /// Running remote commands against the pod
    Dispatch,
    /// Reading pod state for `status`
    Inspect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Descriptor => "descriptor",
            Stage::Provision => "provision",
            Stage::WaitForPod => "wait-for-pod",
            Stage::Dispatch => "dispatch",
            Stage::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

/// A failed flow: the stage that failed and why.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct FlowError {
    pub stage: Stage,
    #[source]
    pub source: DevError,
}

impl FlowError {
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}

/// Attach a stage to a component result.
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, FlowError>;
}

impl<T> AtStage<T> for Result<T, DevError> {
    fn at(self, stage: Stage) -> Result<T, FlowError> {
        self.map_err(|source| FlowError { stage, source })
    }
}
