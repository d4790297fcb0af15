//! In-memory cluster and remote-exec fakes for unit tests
//!
//! `FakeCluster` stores created objects and replays a scripted sequence of
//! pod lists, one per `list_pods` call, repeating the last one. `FakeRemote`
//! records every invocation and fails the ones it was told to.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::cluster::{labels_of, ClusterClient, ClusterError, Manifest, Pod, ResourceKind};
use crate::manifest::LabelSelector;
use crate::remote::{ContainerRef, ExecError, ExecOutput, PortMapping, RemoteExec};

type ObjectKey = (ResourceKind, String);

#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    create_calls: Mutex<Vec<ObjectKey>>,
    failures: Mutex<HashMap<ResourceKind, String>>,
    route_host: Mutex<Option<String>>,
    pod_script: Mutex<VecDeque<Vec<Value>>>,
    list_calls: Mutex<usize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every create call in order, including failed and conflicting ones
    pub fn create_calls(&self) -> Vec<ObjectKey> {
        self.create_calls.lock().unwrap().clone()
    }

    pub fn objects(&self) -> BTreeMap<ObjectKey, Value> {
        self.objects.lock().unwrap().clone()
    }

    pub fn insert(&self, kind: ResourceKind, name: &str, object: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert((kind, name.to_string()), object);
    }

    /// Make every create of `kind` fail with an API error
    pub fn fail_create(&self, kind: ResourceKind, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(kind, message.to_string());
    }

    /// Host the fake "router" assigns to created routes
    pub fn assign_route_host(&self, host: &str) {
        *self.route_host.lock().unwrap() = Some(host.to_string());
    }

    /// Pod lists returned by successive `list_pods` calls
    pub fn script_pods(&self, lists: Vec<Vec<Value>>) {
        *self.pod_script.lock().unwrap() = lists.into();
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create(&self, _namespace: &str, manifest: &Manifest) -> Result<Value, ClusterError> {
        let key = (manifest.kind, manifest.name.clone());
        self.create_calls.lock().unwrap().push(key.clone());

        if let Some(message) = self.failures.lock().unwrap().get(&manifest.kind) {
            return Err(ClusterError::Api(message.clone()));
        }

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: manifest.kind,
                name: manifest.name.clone(),
            });
        }

        let mut object = manifest.body.clone();
        if manifest.kind == ResourceKind::Route {
            if let Some(host) = self.route_host.lock().unwrap().as_ref() {
                object["spec"]["host"] = json!(host);
            }
        }
        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn get(
        &self,
        _namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Value, ClusterError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        *self.list_calls.lock().unwrap() += 1;

        let mut script = self.pod_script.lock().unwrap();
        let current = if script.len() > 1 {
            script.pop_front().unwrap_or_default()
        } else {
            script.front().cloned().unwrap_or_default()
        };

        current
            .into_iter()
            .filter(|p| selector.matches(&labels_of(p)))
            .map(|p| serde_json::from_value(p).map_err(ClusterError::from))
            .collect()
    }
}

/// Build a pod object for scripting.
///
/// `containers` lists the readiness of each container status.
pub fn pod(name: &str, app: &str, phase: &str, containers: &[bool], created: &str) -> Value {
    let statuses: Vec<Value> = containers
        .iter()
        .enumerate()
        .map(|(i, ready)| json!({"name": format!("c{}", i), "ready": ready}))
        .collect();
    json!({
        "metadata": {
            "name": name,
            "labels": {"app": app, "deploymentconfig": app},
            "creationTimestamp": created,
        },
        "status": {"phase": phase, "containerStatuses": statuses},
    })
}

/// One recorded remote invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Exec {
        target: ContainerRef,
        argv: Vec<String>,
    },
    Copy {
        target: ContainerRef,
        local: PathBuf,
        remote: String,
    },
    Logs {
        target: ContainerRef,
    },
    PortForward {
        pod: String,
        ports: PortMapping,
    },
}

#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    exec_failures: Mutex<Vec<(String, i32)>>,
    copy_failures: Mutex<Vec<String>>,
    fail_logs: Mutex<bool>,
    hold_streams: Mutex<bool>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make an exec whose joined argv contains `needle` exit with `code`
    pub fn fail_exec_containing(&self, needle: &str, code: i32) {
        self.exec_failures
            .lock()
            .unwrap()
            .push((needle.to_string(), code));
    }

    /// Make copies of a local path ending in `suffix` fail
    pub fn fail_copy_of(&self, suffix: &str) {
        self.copy_failures.lock().unwrap().push(suffix.to_string());
    }

    pub fn fail_logs(&self) {
        *self.fail_logs.lock().unwrap() = true;
    }

    /// Make log streams and port-forwards run until cancelled, like the
    /// real ones
    pub fn hold_until_cancelled(&self) {
        *self.hold_streams.lock().unwrap() = true;
    }

    async fn hold(&self, cancel: &CancellationToken) {
        let hold = *self.hold_streams.lock().unwrap();
        if hold {
            cancel.cancelled().await;
        }
    }
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn exec(&self, target: &ContainerRef, argv: &[String]) -> Result<ExecOutput, ExecError> {
        self.calls.lock().unwrap().push(RemoteCall::Exec {
            target: target.clone(),
            argv: argv.to_vec(),
        });
        let joined = argv.join(" ");
        let failure = self
            .exec_failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, code)| *code);
        Ok(match failure {
            Some(code) => ExecOutput {
                code,
                stdout: String::new(),
                stderr: format!("{} failed", joined),
            },
            None => ExecOutput::default(),
        })
    }

    async fn copy_to(
        &self,
        target: &ContainerRef,
        local: &Path,
        remote_path: &str,
    ) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(RemoteCall::Copy {
            target: target.clone(),
            local: local.to_path_buf(),
            remote: remote_path.to_string(),
        });
        let fails = self
            .copy_failures
            .lock()
            .unwrap()
            .iter()
            .any(|s| local.ends_with(s));
        if fails {
            return Err(ExecError::NonZeroExit {
                code: 1,
                stderr: format!("cannot copy {}", local.display()),
            });
        }
        Ok(())
    }

    async fn stream_logs(
        &self,
        target: &ContainerRef,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(RemoteCall::Logs {
            target: target.clone(),
        });
        if *self.fail_logs.lock().unwrap() {
            return Err(ExecError::PodGone(target.pod.clone()));
        }
        self.hold(&cancel).await;
        Ok(())
    }

    async fn port_forward(
        &self,
        _namespace: &str,
        pod: &str,
        ports: PortMapping,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(RemoteCall::PortForward {
            pod: pod.to_string(),
            ports,
        });
        self.hold(&cancel).await;
        Ok(())
    }
}
