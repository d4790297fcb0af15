//! Configuration for sb
//!
//! Two layers:
//! - [`Config`]: the optional user file `~/.config/sb.toml`
//! - [`Settings`]: the immutable value an invocation runs with, built once
//!   from the config file and the command line
//!
//! Example config:
//!
//! ```toml
//! namespace = "my-dev"
//! oc = "/usr/local/bin/oc"
//!
//! [images]
//! supervisor = "quay.io/snowdrop/supervisord"
//! runtime = "quay.io/snowdrop/spring-boot-s2i"
//!
//! [watch]
//! timeout_secs = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use serde::Deserialize;

use crate::consts::{
    DEFAULT_CACHE_SIZE, DEFAULT_DEBUG_REMOTE_PORT, DEFAULT_RUNTIME_IMAGE,
    DEFAULT_SUPERVISOR_IMAGE, MANIFEST_FILE,
};

/// Top-level configuration file
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Namespace used when neither the CLI nor the manifest names one
    #[serde(default)]
    pub namespace: Option<String>,
    /// Path to the `oc` binary
    #[serde(default)]
    pub oc: Option<PathBuf>,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Images imported into the two image streams
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ImagesConfig {
    #[serde(default = "default_supervisor_image")]
    pub supervisor: String,
    #[serde(default = "default_runtime_image")]
    pub runtime: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            supervisor: default_supervisor_image(),
            runtime: default_runtime_image(),
        }
    }
}

fn default_supervisor_image() -> String {
    DEFAULT_SUPERVISOR_IMAGE.to_string()
}

fn default_runtime_image() -> String {
    DEFAULT_RUNTIME_IMAGE.to_string()
}

/// Build cache (persistent volume claim)
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Storage request, e.g. "1Gi"
    #[serde(default = "default_cache_size")]
    pub size: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: default_cache_size(),
        }
    }
}

fn default_cache_size() -> String {
    DEFAULT_CACHE_SIZE.to_string()
}

/// Pod readiness wait
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    2000
}

/// Source push
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// Paths, relative to the project directory, copied by `push --mode source`
    #[serde(default = "default_source_paths")]
    pub source_paths: Vec<PathBuf>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            source_paths: default_source_paths(),
        }
    }
}

fn default_source_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("src"), PathBuf::from("pom.xml")]
}

/// Remote debugging
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    /// Default `local:remote` mapping for `sb debug`; unset means
    /// `remote_port` on both sides
    #[serde(default)]
    pub ports: Option<String>,
    /// Port the runtime listens on for the debugger (`JAVA_DEBUG_PORT`)
    #[serde(default = "default_debug_remote_port")]
    pub remote_port: u16,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            ports: None,
            remote_port: default_debug_remote_port(),
        }
    }
}

fn default_debug_remote_port() -> u16 {
    DEFAULT_DEBUG_REMOTE_PORT
}

/// Get the XDG config directory
fn get_config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        })
}

/// Default config file path (`~/.config/sb.toml`)
pub fn config_path() -> PathBuf {
    get_config_dir().join("sb.toml")
}

/// Load configuration from the default path or a specific path.
///
/// A missing file yields the defaults.
pub fn load_config_from(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(config_path);

    if !config_path.exists() {
        tracing::debug!(
            "Config not found at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    tracing::debug!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

/// Everything an invocation needs, resolved once and never mutated.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the sources, the build descriptor and `target/`
    pub project_dir: PathBuf,
    /// Path of the application descriptor
    pub manifest_path: PathBuf,
    /// Namespace given on the command line
    pub namespace_override: Option<String>,
    /// Namespace from the config file
    pub default_namespace: Option<String>,
    pub supervisor_image: String,
    pub runtime_image: String,
    pub cache_size: String,
    /// Default `local:remote` mapping for `debug`
    pub debug_ports: String,
    pub debug_remote_port: u16,
    pub watch_timeout: Duration,
    pub poll_interval: Duration,
    pub source_paths: Vec<PathBuf>,
}

impl Settings {
    /// Merge the config file with command-line values.
    pub fn resolve(
        config: &Config,
        project_dir: PathBuf,
        manifest: Option<PathBuf>,
        namespace_override: Option<String>,
    ) -> Self {
        let manifest_path = manifest.unwrap_or_else(|| project_dir.join(MANIFEST_FILE));
        Self {
            manifest_path,
            project_dir,
            namespace_override,
            default_namespace: config.namespace.clone(),
            supervisor_image: config.images.supervisor.clone(),
            runtime_image: config.images.runtime.clone(),
            cache_size: config.cache.size.clone(),
            debug_ports: config
                .debug
                .ports
                .clone()
                .unwrap_or_else(|| format!("{0}:{0}", config.debug.remote_port)),
            debug_remote_port: config.debug.remote_port,
            watch_timeout: Duration::from_secs(config.watch.timeout_secs),
            poll_interval: Duration::from_millis(config.watch.poll_interval_ms.max(1)),
            source_paths: config.push.source_paths.clone(),
        }
    }
}
