//! Resource provisioning for the development pod
//!
//! Objects are created one at a time in dependency order: image streams
//! (targets of the image-change triggers), the cache claim, the deployment
//! config, then the service and route in front of it. Any failure stops the
//! sequence; nothing already created is rolled back.
//!
//! Re-running against a namespace that already holds the objects succeeds:
//! an "already exists" answer is logged and the object is left as it is.

use serde_json::Value;

use crate::cluster::{ClusterClient, ClusterError, Manifest, ResourceKind};
use crate::error::DevError;
use crate::manifest::ApplicationDescriptor;
use crate::resources::{self, DeploymentHandle, ResourceOptions};

/// What happened to one object of the resource set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExisted,
}

/// Result of a successful provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub deployment: DeploymentHandle,
    /// Every object in creation order
    pub outcomes: Vec<(ResourceKind, String, CreateOutcome)>,
    /// Host assigned to the route, when the cluster reported one
    pub route_host: Option<String>,
}

pub struct ResourceProvisioner<'a, C: ClusterClient> {
    client: &'a C,
    options: ResourceOptions,
}

impl<'a, C: ClusterClient> ResourceProvisioner<'a, C> {
    pub fn new(client: &'a C, options: ResourceOptions) -> Self {
        Self { client, options }
    }

    /// Create the resource set for `app`.
    pub async fn provision(&self, app: &ApplicationDescriptor) -> Result<ProvisionReport, DevError> {
        let mut outcomes = Vec::new();

        let leading = [
            resources::supervisor_image_stream(app, &self.options),
            resources::runtime_image_stream(app, &self.options),
            resources::cache_claim(app, &self.options),
        ];
        for manifest in &leading {
            self.create(app, manifest, &mut outcomes).await?;
        }

        let dc = resources::deployment_config(app, &self.options);
        let dc_object = self.create(app, &dc, &mut outcomes).await?;
        let deployment = DeploymentHandle::from_object(&dc_object)
            .map_err(|e| creation_error(&dc, ClusterError::Decode(e)))?;
        tracing::debug!(
            "Deployment config {} triggers on containers {:?}",
            deployment.name,
            deployment.trigger_containers
        );

        let svc = resources::service(app, &deployment);
        self.create(app, &svc, &mut outcomes).await?;

        let route = resources::route(app);
        let route_object = self.create(app, &route, &mut outcomes).await?;
        let route_host = resources::route_host(&route_object).map(str::to_string);

        Ok(ProvisionReport {
            deployment,
            outcomes,
            route_host,
        })
    }

    /// Create one object. An existing object is fetched and returned instead.
    async fn create(
        &self,
        app: &ApplicationDescriptor,
        manifest: &Manifest,
        outcomes: &mut Vec<(ResourceKind, String, CreateOutcome)>,
    ) -> Result<Value, DevError> {
        tracing::info!("Creating {} {}", manifest.kind, manifest.name);
        tracing::debug!("{} {}: {}", manifest.kind, manifest.name, manifest.body);

        let (object, outcome) = match self.client.create(app.namespace(), manifest).await {
            Ok(object) => (object, CreateOutcome::Created),
            Err(ClusterError::AlreadyExists { .. }) => {
                tracing::info!(
                    "{} {} already exists, leaving it unchanged",
                    manifest.kind,
                    manifest.name
                );
                let object = self
                    .client
                    .get(app.namespace(), manifest.kind, &manifest.name)
                    .await
                    .map_err(|e| creation_error(manifest, e))?;
                (object, CreateOutcome::AlreadyExisted)
            }
            Err(e) => return Err(creation_error(manifest, e)),
        };

        outcomes.push((manifest.kind, manifest.name.clone(), outcome));
        Ok(object)
    }
}

fn creation_error(manifest: &Manifest, source: ClusterError) -> DevError {
    DevError::ResourceCreation {
        kind: manifest.kind,
        name: manifest.name.clone(),
        source,
    }
}
