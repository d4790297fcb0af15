//! `oc` CLI backend
//!
//! Implements both [`ClusterClient`] and [`RemoteExec`] by running the
//! OpenShift client. Objects go in and come out as JSON (`-o json`), and
//! failures are classified from the client's stderr.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterClient, ClusterError, Manifest, Pod, PodList, ResourceKind};
use crate::manifest::LabelSelector;
use crate::remote::{ContainerRef, ExecError, ExecOutput, PortMapping, RemoteExec};

/// Handle on the `oc` binary
#[derive(Debug, Clone)]
pub struct OcCli {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl OcCli {
    pub fn new(binary: Option<PathBuf>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from("oc")),
            kubeconfig,
        }
    }

    /// Create a Command for running oc
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd
    }

    async fn output(&self, args: &[String]) -> std::io::Result<Output> {
        tracing::debug!("oc {}", args.join(" "));
        self.command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }

    /// Run a long-lived command until it exits or `cancel` fires.
    ///
    /// The child gets its own process group so a terminal Ctrl-C reaches
    /// only sb, which stops the child through `cancel`. A child that still
    /// dies first (signalled from elsewhere) counts as stopped when `cancel`
    /// fires within [`CANCEL_GRACE`].
    async fn follow(&self, args: &[String], cancel: &CancellationToken) -> Result<(), ExecError> {
        tracing::debug!("oc {}", args.join(" "));
        let mut cmd = self.command();
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd.spawn()?;

        let exited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let status = match exited {
            None => {
                tracing::debug!("Stopping oc {}", args.first().map(String::as_str).unwrap_or(""));
                child.kill().await?;
                return Ok(());
            }
            Some(status) => status?,
        };
        if status.success() {
            return Ok(());
        }
        if tokio::time::timeout(CANCEL_GRACE, cancel.cancelled())
            .await
            .is_ok()
        {
            tracing::debug!("oc {} ended by interrupt", args.first().map(String::as_str).unwrap_or(""));
            return Ok(());
        }
        Err(ExecError::NonZeroExit {
            code: status.code().unwrap_or(-1),
            stderr: "see output above".to_string(),
        })
    }
}

/// How long a failed long-lived child waits for a pending cancellation
const CANCEL_GRACE: Duration = Duration::from_millis(500);

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Classify a failed `oc create`
fn create_error(kind: ResourceKind, name: &str, stderr: &str) -> ClusterError {
    if stderr.contains("AlreadyExists") || stderr.contains("already exists") {
        ClusterError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    } else {
        ClusterError::Api(stderr.to_string())
    }
}

/// Classify a failed `oc get`
fn get_error(kind: ResourceKind, name: &str, stderr: &str) -> ClusterError {
    if stderr.contains("NotFound") || stderr.contains("not found") {
        ClusterError::NotFound {
            kind,
            name: name.to_string(),
        }
    } else {
        ClusterError::Api(stderr.to_string())
    }
}

fn pod_gone(pod: &str, stderr: &str) -> bool {
    stderr.contains(&format!("pods \"{}\" not found", pod))
}

/// Classify a failed exec or copy
fn exec_error(pod: &str, code: i32, stderr: String) -> ExecError {
    if pod_gone(pod, &stderr) {
        ExecError::PodGone(pod.to_string())
    } else {
        ExecError::NonZeroExit { code, stderr }
    }
}

fn exec_args(target: &ContainerRef, argv: &[String]) -> Vec<String> {
    let mut args = strings(["exec", "-n"]);
    args.push(target.namespace.clone());
    args.push(target.pod.clone());
    args.push("-c".to_string());
    args.push(target.container.clone());
    args.push("--".to_string());
    args.extend(argv.iter().cloned());
    args
}

fn copy_args(target: &ContainerRef, local: &Path, remote_path: &str) -> Vec<String> {
    vec![
        "cp".to_string(),
        "-n".to_string(),
        target.namespace.clone(),
        "-c".to_string(),
        target.container.clone(),
        local.to_string_lossy().to_string(),
        format!("{}:{}", target.pod, remote_path),
    ]
}

#[async_trait]
impl ClusterClient for OcCli {
    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Value, ClusterError> {
        let args = strings(["create", "-n", namespace, "-o", "json", "-f", "-"]);
        tracing::debug!("oc {}", args.join(" "));

        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let body = serde_json::to_vec(&manifest.body)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&body).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(create_error(manifest.kind, &manifest.name, &stderr_of(&output)));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let output = self
            .output(&strings(["get", kind.api_name(), name, "-n", namespace, "-o", "json"]))
            .await?;
        if !output.status.success() {
            return Err(get_error(kind, name, &stderr_of(&output)));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        let selector = selector.to_string();
        let output = self
            .output(&strings([
                "get",
                ResourceKind::Pod.api_name(),
                "-n",
                namespace,
                "-l",
                &selector,
                "-o",
                "json",
            ]))
            .await?;
        if !output.status.success() {
            return Err(ClusterError::Api(stderr_of(&output)));
        }
        let list: PodList = serde_json::from_slice(&output.stdout)?;
        Ok(list.items)
    }
}

#[async_trait]
impl RemoteExec for OcCli {
    async fn exec(&self, target: &ContainerRef, argv: &[String]) -> Result<ExecOutput, ExecError> {
        let output = self.output(&exec_args(target, argv)).await?;
        let code = output.status.code().unwrap_or(-1);
        let stderr = stderr_of(&output);
        if !output.status.success() && pod_gone(&target.pod, &stderr) {
            return Err(ExecError::PodGone(target.pod.clone()));
        }
        Ok(ExecOutput {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }

    async fn copy_to(
        &self,
        target: &ContainerRef,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), ExecError> {
        // oc cp does not create missing parents
        let parent = Path::new(remote_path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string());
        let mkdir = self
            .exec(target, &strings(["mkdir", "-p", &parent]))
            .await?;
        if !mkdir.success() {
            return Err(ExecError::NonZeroExit {
                code: mkdir.code,
                stderr: format!("mkdir -p {}: {}", parent, mkdir.stderr.trim()),
            });
        }

        let output = self.output(&copy_args(target, local, remote_path)).await?;
        if !output.status.success() {
            return Err(exec_error(
                &target.pod,
                output.status.code().unwrap_or(-1),
                stderr_of(&output),
            ));
        }
        Ok(())
    }

    async fn stream_logs(
        &self,
        target: &ContainerRef,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        let args = strings([
            "logs",
            "-f",
            "-n",
            &target.namespace,
            &target.pod,
            "-c",
            &target.container,
        ]);
        self.follow(&args, &cancel).await
    }

    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        ports: PortMapping,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        let mapping = ports.to_string();
        let args = strings(["port-forward", "-n", namespace, pod, &mapping]);
        self.follow(&args, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ContainerRef {
        ContainerRef {
            namespace: "dev".to_string(),
            pod: "demo-1-abcde".to_string(),
            container: "demo".to_string(),
        }
    }

    #[test]
    fn test_create_error_classification() {
        let err = create_error(
            ResourceKind::Route,
            "demo",
            r#"Error from server (AlreadyExists): routes.route.openshift.io "demo" already exists"#,
        );
        assert!(matches!(err, ClusterError::AlreadyExists { kind: ResourceKind::Route, .. }));

        let err = create_error(
            ResourceKind::Route,
            "demo",
            "Error from server (Forbidden): routes is forbidden",
        );
        assert!(matches!(err, ClusterError::Api(ref msg) if msg.contains("Forbidden")));
    }

    #[test]
    fn test_get_error_classification() {
        let err = get_error(
            ResourceKind::DeploymentConfig,
            "demo",
            r#"Error from server (NotFound): deploymentconfigs.apps.openshift.io "demo" not found"#,
        );
        assert!(matches!(err, ClusterError::NotFound { .. }));
        let err = get_error(ResourceKind::DeploymentConfig, "demo", "Unauthorized");
        assert!(matches!(err, ClusterError::Api(_)));
    }

    #[test]
    fn test_exec_error_classification() {
        let err = exec_error(
            "demo-1-abcde",
            1,
            r#"Error from server (NotFound): pods "demo-1-abcde" not found"#.to_string(),
        );
        assert!(matches!(err, ExecError::PodGone(ref p) if p == "demo-1-abcde"));

        let err = exec_error("demo-1-abcde", 2, "no such process".to_string());
        assert!(matches!(err, ExecError::NonZeroExit { code: 2, .. }));
    }

    #[test]
    fn test_exec_args_name_container() {
        let argv = strings(["/var/lib/supervisord/bin/supervisord", "ctl", "start", "run-java"]);
        assert_eq!(
            exec_args(&target(), &argv),
            vec![
                "exec",
                "-n",
                "dev",
                "demo-1-abcde",
                "-c",
                "demo",
                "--",
                "/var/lib/supervisord/bin/supervisord",
                "ctl",
                "start",
                "run-java"
            ]
        );
    }

    #[test]
    fn test_copy_args() {
        let args = copy_args(&target(), Path::new("/work/demo/pom.xml"), "/tmp/src/pom.xml");
        assert_eq!(
            args,
            vec![
                "cp",
                "-n",
                "dev",
                "-c",
                "demo",
                "/work/demo/pom.xml",
                "demo-1-abcde:/tmp/src/pom.xml"
            ]
        );
    }

    #[test]
    fn test_default_binary() {
        let oc = OcCli::new(None, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(oc.binary, PathBuf::from("oc"));
        let cmd = oc.command();
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, vec!["--kubeconfig", "/tmp/kubeconfig"]);
    }

    /// An `oc` stand-in running `body` as a shell script
    #[cfg(unix)]
    fn scripted_oc(dir: &Path, body: &str) -> OcCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("oc");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        OcCli::new(Some(path), None)
    }

    fn ports() -> PortMapping {
        "5005:5005".parse().unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_port_forward_cancel_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let oc = scripted_oc(dir.path(), "exec sleep 30");
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            }
        });

        let started = std::time::Instant::now();
        oc.port_forward("dev", "demo-1-abcde", ports(), cancel)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupted_child_then_cancel_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let oc = scripted_oc(
            dir.path(),
            &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
        );
        let cancel = CancellationToken::new();
        let forward = tokio::spawn({
            let cancel = cancel.clone();
            async move { oc.port_forward("dev", "demo-1-abcde", ports(), cancel).await }
        });

        let mut pid = String::new();
        for _ in 0..500 {
            pid = std::fs::read_to_string(&pid_file).unwrap_or_default();
            if !pid.trim().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!pid.trim().is_empty(), "child never started");

        // Terminal Ctrl-C: the child dies, sb's handler cancels right after
        let status = std::process::Command::new("kill")
            .args(["-INT", pid.trim()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();

        let result = forward.await.unwrap();
        assert!(result.is_ok(), "{:?}", result);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_logs_failure_without_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let oc = scripted_oc(dir.path(), "exit 3");
        let err = oc
            .stream_logs(&target(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit { code: 3, .. }), "{:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_stops_when_mkdir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("copied");
        let oc = scripted_oc(
            dir.path(),
            &format!(
                "case \"$1\" in\n  exec) echo 'permission denied' >&2; exit 1 ;;\n  cp) touch '{}' ;;\nesac",
                marker.display()
            ),
        );

        let err = oc
            .copy_to(&target(), Path::new("/work/demo/pom.xml"), "/tmp/src/pom.xml")
            .await
            .unwrap_err();
        match err {
            ExecError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 1);
                assert!(stderr.contains("mkdir -p /tmp/src"), "{}", stderr);
                assert!(stderr.contains("permission denied"), "{}", stderr);
            }
            other => panic!("expected non-zero exit, got {:?}", other),
        }
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_after_mkdir() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("copied");
        let oc = scripted_oc(
            dir.path(),
            &format!("case \"$1\" in\n  cp) touch '{}' ;;\nesac", marker.display()),
        );

        oc.copy_to(&target(), Path::new("/work/demo/pom.xml"), "/tmp/src/pom.xml")
            .await
            .unwrap();
        assert!(marker.exists());
    }
}
