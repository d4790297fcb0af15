//! Developer intents run against the ready pod
//!
//! An [`Intent`] is first turned into an ordered plan of [`Invocation`]s,
//! which validates everything that can be checked locally. The plan is then
//! executed step by step against the application's container; the first
//! failing step aborts the rest and nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio_util::sync::CancellationToken;

use crate::consts::{
    BUILD_OUTPUT_DIR, COMPILE_PROCESS, DEPLOYMENTS_PATH, RUN_PROCESS, SOURCE_STAGING_PATH,
    SUPERVISOR_BIN, SUPERVISOR_CTL,
};
use crate::error::DevError;
use crate::manifest::ApplicationDescriptor;
use crate::remote::{ContainerRef, ExecError, PortMapping, RemoteExec};
use crate::watcher::PodHandle;

/// What `push` copies into the pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    Source,
    Binary,
}

impl FromStr for PushMode {
    type Err = DevError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(PushMode::Source),
            "binary" => Ok(PushMode::Binary),
            other => Err(DevError::config(format!(
                "unknown push mode '{}': expected 'source' or 'binary'",
                other
            ))),
        }
    }
}

/// A developer intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Start the in-pod build, optionally following its output
    Compile { follow: bool },
    PushSource,
    PushBinary,
    /// Restart the run process and forward the debug port
    DebugStart { ports: PortMapping },
}

impl Intent {
    pub fn push(mode: PushMode) -> Self {
        match mode {
            PushMode::Source => Intent::PushSource,
            PushMode::Binary => Intent::PushBinary,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::Compile { .. } => "compile",
            Intent::PushSource => "push-source",
            Intent::PushBinary => "push-binary",
            Intent::DebugStart { .. } => "debug-start",
        };
        f.write_str(name)
    }
}

/// Supervisor control action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctl {
    Start,
    Stop,
}

impl Ctl {
    fn as_str(&self) -> &'static str {
        match self {
            Ctl::Start => "start",
            Ctl::Stop => "stop",
        }
    }
}

fn supervisor_ctl(action: Ctl, process: &str) -> Vec<String> {
    vec![
        SUPERVISOR_BIN.to_string(),
        SUPERVISOR_CTL.to_string(),
        action.as_str().to_string(),
        process.to_string(),
    ]
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Exec {
        step: &'static str,
        argv: Vec<String>,
    },
    Copy {
        step: &'static str,
        local: PathBuf,
        remote: String,
    },
    /// Follow the container log until cancelled. Failure is not fatal.
    Logs,
    /// Forward a port until cancelled
    PortForward { ports: PortMapping },
}

impl Invocation {
    pub fn step(&self) -> &'static str {
        match self {
            Invocation::Exec { step, .. } | Invocation::Copy { step, .. } => *step,
            Invocation::Logs => "logs",
            Invocation::PortForward { .. } => "port-forward",
        }
    }
}

/// Local inputs of the push intents
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub project_dir: PathBuf,
    pub source_paths: Vec<PathBuf>,
}

pub struct RemoteCommandDispatcher<'a, R: RemoteExec> {
    remote: &'a R,
    options: DispatchOptions,
}

impl<'a, R: RemoteExec> RemoteCommandDispatcher<'a, R> {
    pub fn new(remote: &'a R, options: DispatchOptions) -> Self {
        Self { remote, options }
    }

    /// Resolve `intent` into its ordered invocations.
    ///
    /// Local paths are checked here so a missing file fails before anything
    /// touches the pod.
    pub fn plan(
        &self,
        intent: Intent,
        app: &ApplicationDescriptor,
    ) -> Result<Vec<Invocation>, DevError> {
        let plan = match intent {
            Intent::Compile { follow } => {
                let mut plan = vec![Invocation::Exec {
                    step: "compile",
                    argv: supervisor_ctl(Ctl::Start, COMPILE_PROCESS),
                }];
                if follow {
                    plan.push(Invocation::Logs);
                }
                plan
            }
            Intent::PushSource => {
                let mut plan = Vec::with_capacity(self.options.source_paths.len());
                for rel in &self.options.source_paths {
                    let local = self.local_path(rel)?;
                    let file_name = local.file_name().ok_or_else(|| {
                        DevError::config(format!("source path {} has no file name", rel.display()))
                    })?;
                    let remote = format!("{}/{}", SOURCE_STAGING_PATH, file_name.to_string_lossy());
                    plan.push(Invocation::Copy {
                        step: "push-source",
                        local,
                        remote,
                    });
                }
                plan
            }
            Intent::PushBinary => {
                let archive = app.archive_name();
                let local = self.local_path(&Path::new(BUILD_OUTPUT_DIR).join(&archive))?;
                vec![Invocation::Copy {
                    step: "push-binary",
                    local,
                    remote: format!("{}/{}", DEPLOYMENTS_PATH, archive),
                }]
            }
            Intent::DebugStart { ports } => vec![
                Invocation::Exec {
                    step: "debug-stop",
                    argv: supervisor_ctl(Ctl::Stop, RUN_PROCESS),
                },
                Invocation::Exec {
                    step: "debug-start",
                    argv: supervisor_ctl(Ctl::Start, RUN_PROCESS),
                },
                Invocation::PortForward { ports },
            ],
        };
        Ok(plan)
    }

    /// Plan and run `intent` against the application container of `pod`.
    pub async fn dispatch(
        &self,
        intent: Intent,
        app: &ApplicationDescriptor,
        pod: &PodHandle,
        cancel: &CancellationToken,
    ) -> Result<(), DevError> {
        let plan = self.plan(intent, app)?;
        self.execute(&plan, app, pod, cancel).await
    }

    /// Run a plan, stopping at the first failing step.
    async fn execute(
        &self,
        plan: &[Invocation],
        app: &ApplicationDescriptor,
        pod: &PodHandle,
        cancel: &CancellationToken,
    ) -> Result<(), DevError> {
        let target = ContainerRef {
            namespace: pod.namespace.clone(),
            pod: pod.name.clone(),
            container: app.name().to_string(),
        };

        for invocation in plan {
            self.run(invocation, &target, cancel).await?;
        }
        Ok(())
    }

    async fn run(
        &self,
        invocation: &Invocation,
        target: &ContainerRef,
        cancel: &CancellationToken,
    ) -> Result<(), DevError> {
        let step = invocation.step();
        let failed = |source: ExecError| DevError::RemoteExec {
            step: step.to_string(),
            source,
        };

        match invocation {
            Invocation::Exec { argv, .. } => {
                tracing::info!("Running {} in {}", step, target);
                tracing::debug!("exec {}: {:?}", target, argv);
                let out = self.remote.exec(target, argv).await.map_err(failed)?;
                if !out.stdout.trim().is_empty() {
                    tracing::debug!("{}: {}", step, out.stdout.trim());
                }
                if !out.success() {
                    return Err(failed(ExecError::NonZeroExit {
                        code: out.code,
                        stderr: out.stderr.trim().to_string(),
                    }));
                }
            }
            Invocation::Copy { local, remote, .. } => {
                tracing::info!("Copying {} to {}", local.display(), remote);
                self.remote
                    .copy_to(target, local, remote)
                    .await
                    .map_err(failed)?;
            }
            Invocation::Logs => {
                tracing::info!("Following logs of {} (Ctrl-C to stop)", target);
                if let Err(e) = self.remote.stream_logs(target, cancel.clone()).await {
                    tracing::warn!("Log stream of {} ended: {}", target, e);
                }
            }
            Invocation::PortForward { ports } => {
                tracing::info!(
                    "Forwarding localhost:{} to {}:{} (Ctrl-C to stop)",
                    ports.local,
                    target.pod,
                    ports.remote
                );
                self.remote
                    .port_forward(&target.namespace, &target.pod, *ports, cancel.clone())
                    .await
                    .map_err(failed)?;
            }
        }
        Ok(())
    }

    fn local_path(&self, rel: &Path) -> Result<PathBuf, DevError> {
        let path = self.options.project_dir.join(rel);
        if !path.exists() {
            return Err(DevError::config(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Ok(path)
    }
}
