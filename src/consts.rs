//! Constants used throughout sb
//!
//! The mount paths and supervisor locations are a contract with the
//! supervisor image: the init container copies the daemon into
//! [`SUPERVISOR_MOUNT_PATH`] and every remote command calls it from there.

/// Label key carrying the application name
pub const LABEL_APP: &str = "app";

/// Label key carrying the deployment config name
pub const LABEL_DEPLOYMENT_CONFIG: &str = "deploymentconfig";

/// Marker label key for deployment configs that get the supervisor injected
pub const LABEL_INJECT_KEY: &str = "io.openshift.odo";

/// Marker label value for deployment configs that get the supervisor injected
pub const LABEL_INJECT_VALUE: &str = "inject-supervisord";

/// Where the shared volume holding the supervisor is mounted
pub const SUPERVISOR_MOUNT_PATH: &str = "/var/lib/supervisord";

/// Where the build-artifact cache (the PVC) is mounted
pub const ARTIFACTS_MOUNT_PATH: &str = "/tmp/artifacts";

/// Supervisor daemon binary inside the shared volume
pub const SUPERVISOR_BIN: &str = "/var/lib/supervisord/bin/supervisord";

/// Supervisor configuration inside the shared volume
pub const SUPERVISOR_CONF: &str = "/var/lib/supervisord/conf/supervisor.conf";

/// Supervisor subcommand used to control managed processes
pub const SUPERVISOR_CTL: &str = "ctl";

/// Managed process that builds the project
pub const COMPILE_PROCESS: &str = "compile-java";

/// Managed process that runs the application
pub const RUN_PROCESS: &str = "run-java";

/// Managed processes announced to the supervisor, as `name:command` pairs
pub const SUPERVISOR_CMDS: &str = "echo:/var/lib/supervisord/conf/echo.sh;run-java:/usr/local/s2i/run;compile-java:/usr/local/s2i/assemble;build:/deployments/buildapp";

/// Name of the init container, and of the image stream it is built from
pub const SUPERVISOR_IMAGE_STREAM: &str = "copy-supervisord";

/// Image stream of the application runtime (S2I builder) image
pub const RUNTIME_IMAGE_STREAM: &str = "dev-runtime";

/// Tag tracked by both image streams
pub const IMAGE_TAG: &str = "latest";

/// Default image imported into the supervisor image stream
pub const DEFAULT_SUPERVISOR_IMAGE: &str = "quay.io/snowdrop/supervisord";

/// Default image imported into the runtime image stream
pub const DEFAULT_RUNTIME_IMAGE: &str = "quay.io/snowdrop/spring-boot-s2i";

/// Name of the `emptyDir` volume shared between init and main container
pub const SHARED_VOLUME: &str = "shared-data";

/// Suffix of the PVC (and its volume) used as build cache
pub const CACHE_VOLUME_SUFFIX: &str = "m2-data";

/// Default storage request of the build cache
pub const DEFAULT_CACHE_SIZE: &str = "1Gi";

/// Remote directory receiving pushed sources
pub const SOURCE_STAGING_PATH: &str = "/tmp/src";

/// Remote directory receiving pushed binaries, also `JAVA_APP_DIR`
pub const DEPLOYMENTS_PATH: &str = "/deployments";

/// Local directory holding the built archive
pub const BUILD_OUTPUT_DIR: &str = "target";

/// Default remote debug port, exported as `JAVA_DEBUG_PORT`
pub const DEFAULT_DEBUG_REMOTE_PORT: u16 = 5005;

/// Default descriptor file name, relative to the project directory
pub const MANIFEST_FILE: &str = "MANIFEST";
