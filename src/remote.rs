//! Remote command execution interface
//!
//! Everything that runs inside the development pod goes through
//! [`RemoteExec`]. The pod has an init container next to the long-running
//! one, so exec, copy and logs always name their container explicitly.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::DevError;

/// Errors from a single remote invocation
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("pod {0} no longer exists")]
    PodGone(String),

    #[error("failed to run remote client: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A container inside a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.container)
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A `local:remote` port pair for port forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl FromStr for PortMapping {
    type Err = DevError;

    /// Accepts `local:remote`, or a single port used on both sides.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn port(s: &str, whole: &str) -> Result<u16, DevError> {
            s.trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    DevError::config(format!(
                        "invalid port mapping '{}': ports must be between 1 and 65535",
                        whole
                    ))
                })
        }

        match s.split_once(':') {
            Some((local, remote)) => Ok(Self {
                local: port(local, s)?,
                remote: port(remote, s)?,
            }),
            None => {
                let p = port(s, s)?;
                Ok(Self {
                    local: p,
                    remote: p,
                })
            }
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `argv` in the container and capture its output.
    async fn exec(&self, target: &ContainerRef, argv: &[String]) -> Result<ExecOutput, ExecError>;

    /// Copy a local file or directory to `remote_path` in the container.
    async fn copy_to(
        &self,
        target: &ContainerRef,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), ExecError>;

    /// Follow the container's log until it ends or `cancel` fires.
    async fn stream_logs(
        &self,
        target: &ContainerRef,
        cancel: CancellationToken,
    ) -> Result<(), ExecError>;

    /// Forward a local port to the pod until `cancel` fires.
    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        ports: PortMapping,
        cancel: CancellationToken,
    ) -> Result<(), ExecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping_parse() {
        let m: PortMapping = "5005:5005".parse().unwrap();
        assert_eq!(m, PortMapping { local: 5005, remote: 5005 });

        let m: PortMapping = "15005:5005".parse().unwrap();
        assert_eq!(m.local, 15005);
        assert_eq!(m.remote, 5005);
        assert_eq!(m.to_string(), "15005:5005");

        let m: PortMapping = "8000".parse().unwrap();
        assert_eq!(m, PortMapping { local: 8000, remote: 8000 });
    }

    #[test]
    fn test_port_mapping_invalid() {
        for bad in ["", ":", "abc", "5005:", ":5005", "0:5005", "5005:70000", "1:2:3"] {
            let err = bad.parse::<PortMapping>().unwrap_err();
            assert!(matches!(err, DevError::Configuration(_)), "{}", bad);
        }
    }

    #[test]
    fn test_container_ref_display() {
        let target = ContainerRef {
            namespace: "dev".to_string(),
            pod: "demo-1-abcde".to_string(),
            container: "demo".to_string(),
        };
        assert_eq!(target.to_string(), "dev/demo-1-abcde:demo");
    }
}
