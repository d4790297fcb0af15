//! Manifests of the resource set
//!
//! Pure functions from an [`ApplicationDescriptor`] to the JSON bodies sent
//! to the cluster. Every object carries the `{app, deploymentconfig}` label
//! pair so the watcher's selector finds exactly what was created here.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::cluster::{Manifest, ResourceKind};
use crate::config::Settings;
use crate::consts::{
    ARTIFACTS_MOUNT_PATH, CACHE_VOLUME_SUFFIX, DEPLOYMENTS_PATH, IMAGE_TAG, LABEL_INJECT_KEY,
    LABEL_INJECT_VALUE, RUNTIME_IMAGE_STREAM, SHARED_VOLUME, SUPERVISOR_BIN, SUPERVISOR_CMDS,
    SUPERVISOR_CONF, SUPERVISOR_IMAGE_STREAM, SUPERVISOR_MOUNT_PATH,
};
use crate::manifest::ApplicationDescriptor;

/// Inputs for the manifests that do not come from the descriptor
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    pub supervisor_image: String,
    pub runtime_image: String,
    pub cache_size: String,
    pub debug_port: u16,
}

impl From<&Settings> for ResourceOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            supervisor_image: settings.supervisor_image.clone(),
            runtime_image: settings.runtime_image.clone(),
            cache_size: settings.cache_size.clone(),
            debug_port: settings.debug_remote_port,
        }
    }
}

fn labels(app: &ApplicationDescriptor) -> Value {
    json!(app.selector().labels())
}

/// Name of the build cache claim
pub fn cache_claim_name(app: &ApplicationDescriptor) -> String {
    format!("{}-{}", app.name(), CACHE_VOLUME_SUFFIX)
}

fn image_stream(app: &ApplicationDescriptor, name: &str, image: &str) -> Manifest {
    Manifest {
        kind: ResourceKind::ImageStream,
        name: name.to_string(),
        body: json!({
            "apiVersion": "image.openshift.io/v1",
            "kind": "ImageStream",
            "metadata": {
                "name": name,
                "labels": labels(app),
            },
            "spec": {
                "lookupPolicy": {"local": false},
                "tags": [{
                    "name": IMAGE_TAG,
                    "from": {"kind": "DockerImage", "name": image},
                    "importPolicy": {},
                    "referencePolicy": {"type": "Source"},
                }],
            },
        }),
    }
}

/// Image stream of the supervisor (init container) image
pub fn supervisor_image_stream(app: &ApplicationDescriptor, opts: &ResourceOptions) -> Manifest {
    image_stream(app, SUPERVISOR_IMAGE_STREAM, &opts.supervisor_image)
}

/// Image stream of the application runtime image
pub fn runtime_image_stream(app: &ApplicationDescriptor, opts: &ResourceOptions) -> Manifest {
    image_stream(app, RUNTIME_IMAGE_STREAM, &opts.runtime_image)
}

/// Claim backing the build-artifact cache
pub fn cache_claim(app: &ApplicationDescriptor, opts: &ResourceOptions) -> Manifest {
    let name = cache_claim_name(app);
    Manifest {
        kind: ResourceKind::PersistentVolumeClaim,
        name: name.clone(),
        body: json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": name,
                "labels": labels(app),
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": {"requests": {"storage": opts.cache_size}},
            },
        }),
    }
}

fn image_change_trigger(container: &str, image_stream: &str) -> Value {
    json!({
        "type": "ImageChange",
        "imageChangeParams": {
            "automatic": true,
            "containerNames": [container],
            "from": {
                "kind": "ImageStreamTag",
                "name": format!("{}:{}", image_stream, IMAGE_TAG),
            },
        },
    })
}

/// Deployment config of the supervised development pod.
///
/// The init container copies the supervisor into the shared volume; the
/// main container, named after the application, runs it. Two automatic
/// image-change triggers fill in both images from their streams.
pub fn deployment_config(app: &ApplicationDescriptor, opts: &ResourceOptions) -> Manifest {
    let claim = cache_claim_name(app);
    let mut dc_labels = labels(app);
    dc_labels[LABEL_INJECT_KEY] = json!(LABEL_INJECT_VALUE);

    Manifest {
        kind: ResourceKind::DeploymentConfig,
        name: app.name().to_string(),
        body: json!({
            "apiVersion": "apps.openshift.io/v1",
            "kind": "DeploymentConfig",
            "metadata": {
                "name": app.name(),
                "labels": dc_labels,
            },
            "spec": {
                "replicas": 1,
                "selector": labels(app),
                "strategy": {"type": "Rolling"},
                "template": {
                    "metadata": {
                        "name": app.name(),
                        "labels": labels(app),
                    },
                    "spec": {
                        "initContainers": [{
                            "name": SUPERVISOR_IMAGE_STREAM,
                            "image": format!("{}:{}", SUPERVISOR_IMAGE_STREAM, IMAGE_TAG),
                            "env": [{"name": "CMDS", "value": SUPERVISOR_CMDS}],
                            "volumeMounts": [{
                                "name": SHARED_VOLUME,
                                "mountPath": SUPERVISOR_MOUNT_PATH,
                            }],
                        }],
                        "containers": [{
                            "name": app.name(),
                            "image": format!("{}:{}", RUNTIME_IMAGE_STREAM, IMAGE_TAG),
                            "command": [SUPERVISOR_BIN],
                            "args": ["-c", SUPERVISOR_CONF],
                            "ports": [{
                                "containerPort": app.port(),
                                "protocol": "TCP",
                            }],
                            "env": [
                                {"name": "JAVA_APP_DIR", "value": DEPLOYMENTS_PATH},
                                {"name": "JAVA_APP_JAR", "value": app.archive_name()},
                                {"name": "JAVA_DEBUG", "value": "true"},
                                {"name": "JAVA_DEBUG_PORT", "value": opts.debug_port.to_string()},
                            ],
                            "volumeMounts": [
                                {"name": SHARED_VOLUME, "mountPath": SUPERVISOR_MOUNT_PATH},
                                {"name": claim, "mountPath": ARTIFACTS_MOUNT_PATH},
                            ],
                        }],
                        "volumes": [
                            {"name": SHARED_VOLUME, "emptyDir": {}},
                            {"name": claim, "persistentVolumeClaim": {"claimName": claim}},
                        ],
                    },
                },
                "triggers": [
                    image_change_trigger(SUPERVISOR_IMAGE_STREAM, SUPERVISOR_IMAGE_STREAM),
                    image_change_trigger(app.name(), RUNTIME_IMAGE_STREAM),
                ],
            },
        }),
    }
}

/// What the provisioner keeps of the created deployment config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHandle {
    pub name: String,
    pub selector: serde_json::Map<String, Value>,
    /// Containers targeted by the image-change triggers
    pub trigger_containers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeploymentConfigView {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: DeploymentConfigSpecView,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentConfigSpecView {
    #[serde(default)]
    replicas: Option<i64>,
    #[serde(default)]
    selector: serde_json::Map<String, Value>,
    #[serde(default)]
    triggers: Vec<TriggerView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerView {
    #[serde(default)]
    image_change_params: Option<ImageChangeParamsView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageChangeParamsView {
    #[serde(default)]
    container_names: Vec<String>,
}

impl DeploymentHandle {
    /// Read the handle out of a deployment config returned by the cluster
    pub fn from_object(object: &Value) -> Result<Self, serde_json::Error> {
        let view = DeploymentConfigView::deserialize(object)?;
        Ok(Self {
            name: view.metadata.name,
            selector: view.spec.selector,
            trigger_containers: view
                .spec
                .triggers
                .into_iter()
                .filter_map(|t| t.image_change_params)
                .flat_map(|p| p.container_names)
                .collect(),
        })
    }
}

/// Desired replica count of a deployment config object
pub fn desired_replicas(object: &Value) -> Result<Option<i64>, serde_json::Error> {
    let view = DeploymentConfigView::deserialize(object)?;
    Ok(view.spec.replicas)
}

/// Service in front of the pods selected by the deployment config
pub fn service(app: &ApplicationDescriptor, deployment: &DeploymentHandle) -> Manifest {
    let selector = if deployment.selector.is_empty() {
        labels(app)
    } else {
        Value::Object(deployment.selector.clone())
    };
    Manifest {
        kind: ResourceKind::Service,
        name: app.name().to_string(),
        body: json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": app.name(),
                "labels": labels(app),
            },
            "spec": {
                "selector": selector,
                "ports": [{
                    "name": format!("{}-tcp", app.port()),
                    "port": app.port(),
                    "protocol": "TCP",
                    "targetPort": app.port(),
                }],
            },
        }),
    }
}

/// Route exposing the service outside the cluster
pub fn route(app: &ApplicationDescriptor) -> Manifest {
    Manifest {
        kind: ResourceKind::Route,
        name: app.name().to_string(),
        body: json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {
                "name": app.name(),
                "labels": labels(app),
            },
            "spec": {
                "to": {"kind": "Service", "name": app.name()},
                "port": {"targetPort": format!("{}-tcp", app.port())},
            },
        }),
    }
}

/// Host assigned to a created route, if any
pub fn route_host(object: &Value) -> Option<&str> {
    object.pointer("/spec/host").and_then(Value::as_str)
}
