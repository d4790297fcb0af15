//! The developer-facing flows
//!
//! Each flow is a fixed sequence of stages. `init` loads the descriptor and
//! provisions the resource set. `push`, `compile` and `debug` load the
//! descriptor, resolve their plan, wait for a ready pod and dispatch. A
//! failing stage ends the flow and is reported as a [`FlowError`] naming it.

use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterClient, Pod};
use crate::config::Settings;
use crate::dispatch::{DispatchOptions, Intent, PushMode, RemoteCommandDispatcher};
use crate::error::{AtStage, DevError, FlowError, Stage};
use crate::manifest::ApplicationDescriptor;
use crate::provision::{ProvisionReport, ResourceProvisioner};
use crate::remote::{PortMapping, RemoteExec};
use crate::resources::ResourceOptions;
use crate::watcher::{pick_ready, PodReadinessWatcher};

/// Pods of an application as seen by `status`
#[derive(Debug)]
pub struct StatusReport {
    pub app: ApplicationDescriptor,
    pub pods: Vec<Pod>,
    /// The pod the other flows would act on right now
    pub selected: Option<String>,
}

pub struct Orchestrator<'a, C: ClusterClient, R: RemoteExec> {
    cluster: &'a C,
    remote: &'a R,
    settings: &'a Settings,
    cancel: CancellationToken,
}

impl<'a, C: ClusterClient, R: RemoteExec> Orchestrator<'a, C, R> {
    pub fn new(
        cluster: &'a C,
        remote: &'a R,
        settings: &'a Settings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cluster,
            remote,
            settings,
            cancel,
        }
    }

    /// Load and validate the application descriptor.
    pub fn descriptor(&self) -> Result<ApplicationDescriptor, FlowError> {
        ApplicationDescriptor::load(
            &self.settings.manifest_path,
            self.settings.namespace_override.as_deref(),
            self.settings.default_namespace.as_deref(),
        )
        .at(Stage::Descriptor)
    }

    /// Provision the resource set. Does not wait for the pod.
    pub async fn init(&self) -> Result<ProvisionReport, FlowError> {
        let app = self.descriptor()?;
        tracing::info!(
            "[1/2] Loaded {} {} (namespace {})",
            app.name(),
            app.version(),
            app.namespace()
        );

        tracing::info!("[2/2] Provisioning resources");
        let provisioner =
            ResourceProvisioner::new(self.cluster, ResourceOptions::from(self.settings));
        let report = provisioner.provision(&app).await.at(Stage::Provision)?;

        match &report.route_host {
            Some(host) => tracing::info!("Application will be reachable at http://{}", host),
            None => tracing::info!(
                "Deployment config {} rolls out once both images are imported",
                report.deployment.name
            ),
        }
        Ok(report)
    }

    /// Copy sources (`source`) or the built archive (`binary`) into the pod.
    pub async fn push(&self, mode: &str) -> Result<(), FlowError> {
        let mode: PushMode = mode.parse().at(Stage::Dispatch)?;
        self.on_pod(Intent::push(mode)).await
    }

    /// Start the in-pod build, following its log unless `follow` is false.
    pub async fn compile(&self, follow: bool) -> Result<(), FlowError> {
        self.on_pod(Intent::Compile { follow }).await
    }

    /// Restart the run process and forward the debug port. `ports` defaults
    /// to the configured mapping.
    pub async fn debug(&self, ports: Option<&str>) -> Result<(), FlowError> {
        let ports: PortMapping = ports
            .unwrap_or(self.settings.debug_ports.as_str())
            .parse()
            .at(Stage::Dispatch)?;
        self.on_pod(Intent::DebugStart { ports }).await
    }

    /// List the application's pods without waiting.
    pub async fn status(&self) -> Result<StatusReport, FlowError> {
        let app = self.descriptor()?;
        let pods = self
            .cluster
            .list_pods(app.namespace(), &app.selector())
            .await
            .map_err(DevError::from)
            .at(Stage::Inspect)?;
        let selected = pick_ready(&pods).map(|p| p.name().to_string());
        Ok(StatusReport {
            app,
            pods,
            selected,
        })
    }

    async fn on_pod(&self, intent: Intent) -> Result<(), FlowError> {
        let app = self.descriptor()?;
        let dispatcher = RemoteCommandDispatcher::new(
            self.remote,
            DispatchOptions {
                project_dir: self.settings.project_dir.clone(),
                source_paths: self.settings.source_paths.clone(),
            },
        );
        // Local mistakes (paths, archive) fail before the wait
        dispatcher.plan(intent, &app).at(Stage::Dispatch)?;
        tracing::info!("[1/3] Loaded {} (namespace {})", app.name(), app.namespace());

        tracing::info!("[2/3] Waiting for pod");
        let watcher = PodReadinessWatcher::new(
            self.cluster,
            self.settings.watch_timeout,
            self.settings.poll_interval,
        );
        let pod = watcher
            .wait_for_pod(&app, &self.cancel)
            .await
            .at(Stage::WaitForPod)?;

        tracing::info!("[3/3] Running {} on {}", intent, pod.name);
        dispatcher
            .dispatch(intent, &app, &pod, &self.cancel)
            .await
            .at(Stage::Dispatch)
    }
}
