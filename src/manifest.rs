//! Application descriptor (the project's `MANIFEST` file)
//!
//! The descriptor is YAML:
//!
//! ```yaml
//! name: demo
//! version: "1.0"
//! port: 8080
//! namespace: my-project   # optional
//! ```
//!
//! Every resource created for the application is labelled and selected by
//! `name`, so it must not change during a development session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::consts::{LABEL_APP, LABEL_DEPLOYMENT_CONFIG};
use crate::error::DevError;

const DEFAULT_VERSION: &str = "0.0.1-SNAPSHOT";
const DEFAULT_PORT: i64 = 8080;

/// Raw manifest as written by the developer
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    port: Option<i64>,
    #[serde(default)]
    namespace: Option<String>,
}

/// A validated application descriptor. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationDescriptor {
    name: String,
    namespace: String,
    version: String,
    port: u16,
}

impl ApplicationDescriptor {
    /// Build and validate a descriptor from its parts.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        version: impl Into<String>,
        port: i64,
    ) -> Result<Self, DevError> {
        let name = name.into();
        let namespace = namespace.into();
        let version = version.into();

        validate_dns_label("name", &name)?;
        validate_dns_label("namespace", &namespace)?;
        if version.trim().is_empty() {
            return Err(DevError::config("manifest field 'version' must not be empty"));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                DevError::config(format!(
                    "manifest field 'port' must be between 1 and 65535, got {}",
                    port
                ))
            })?;

        Ok(Self {
            name,
            namespace,
            version,
            port,
        })
    }

    /// Parse a descriptor from YAML text.
    ///
    /// `namespace_override` wins over the manifest's own `namespace`, and
    /// `default_namespace` is used when neither is set.
    pub fn parse(
        content: &str,
        namespace_override: Option<&str>,
        default_namespace: Option<&str>,
    ) -> Result<Self, DevError> {
        let raw: RawManifest = serde_yml::from_str(content)
            .map_err(|e| DevError::config(format!("invalid manifest: {}", e)))?;

        let name = raw
            .name
            .ok_or_else(|| DevError::config("manifest is missing required field 'name'"))?;

        let namespace = namespace_override
            .map(str::to_string)
            .or(raw.namespace)
            .or_else(|| default_namespace.map(str::to_string))
            .ok_or_else(|| {
                DevError::config(
                    "no namespace: pass --namespace, set 'namespace' in the manifest or in the config file",
                )
            })?;

        Self::new(
            name,
            namespace,
            raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            raw.port.unwrap_or(DEFAULT_PORT),
        )
    }

    /// Load and parse a descriptor file.
    pub fn load(
        path: &Path,
        namespace_override: Option<&str>,
        default_namespace: Option<&str>,
    ) -> Result<Self, DevError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DevError::config(format!("failed to read manifest {}: {}", path.display(), e))
        })?;
        Self::parse(&content, namespace_override, default_namespace)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// File name of the built archive, `{name}-{version}.jar`
    pub fn archive_name(&self) -> String {
        format!("{}-{}.jar", self.name, self.version)
    }

    /// Label selector matching every object created for this application
    pub fn selector(&self) -> LabelSelector {
        LabelSelector::for_app(&self.name)
    }
}

/// Check a DNS-1123 label: lowercase alphanumerics and '-', 1-63 chars,
/// starting with a letter and ending with an alphanumeric.
fn validate_dns_label(field: &str, value: &str) -> Result<(), DevError> {
    let valid = !value.is_empty()
        && value.len() <= 63
        && value.starts_with(|c: char| c.is_ascii_lowercase())
        && value.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !valid {
        return Err(DevError::config(format!(
            "manifest field '{}' must be a DNS label (lowercase letters, digits and '-'), got '{}'",
            field, value
        )));
    }
    Ok(())
}

/// The `{app, deploymentconfig}` label pair shared by the resource set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector for an application. Depends on the name only.
    pub fn for_app(name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), name.to_string());
        labels.insert(LABEL_DEPLOYMENT_CONFIG.to_string(), name.to_string());
        Self { labels }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Whether an object carrying `labels` is selected
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).map(|l| l == v).unwrap_or(false))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
name: demo
version: "1.0"
port: 8080
namespace: dev
"#;
        let app = ApplicationDescriptor::parse(yaml, None, None).unwrap();
        assert_eq!(app.name(), "demo");
        assert_eq!(app.namespace(), "dev");
        assert_eq!(app.version(), "1.0");
        assert_eq!(app.port(), 8080);
    }

    #[test]
    fn test_parse_defaults() {
        let app = ApplicationDescriptor::parse("name: demo\n", None, Some("fallback")).unwrap();
        assert_eq!(app.namespace(), "fallback");
        assert_eq!(app.version(), DEFAULT_VERSION);
        assert_eq!(app.port(), 8080);
    }

    #[test]
    fn test_namespace_precedence() {
        let yaml = "name: demo\nnamespace: from-manifest\n";
        let app = ApplicationDescriptor::parse(yaml, Some("from-cli"), Some("from-config")).unwrap();
        assert_eq!(app.namespace(), "from-cli");

        let app = ApplicationDescriptor::parse(yaml, None, Some("from-config")).unwrap();
        assert_eq!(app.namespace(), "from-manifest");
    }

    #[test]
    fn test_missing_namespace_is_configuration_error() {
        let err = ApplicationDescriptor::parse("name: demo\n", None, None).unwrap_err();
        assert!(matches!(err, DevError::Configuration(_)));
    }

    #[test]
    fn test_missing_name() {
        let err = ApplicationDescriptor::parse("version: '1.0'\n", Some("dev"), None).unwrap_err();
        match err {
            DevError::Configuration(msg) => assert!(msg.contains("name")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["Demo", "-demo", "demo-", "de_mo", "1demo", ""] {
            let err = ApplicationDescriptor::new(name, "dev", "1.0", 8080).unwrap_err();
            assert!(matches!(err, DevError::Configuration(_)), "{}", name);
        }
        let long = "a".repeat(64);
        assert!(ApplicationDescriptor::new(long, "dev", "1.0", 8080).is_err());
        assert!(ApplicationDescriptor::new("a".repeat(63), "dev", "1.0", 8080).is_ok());
    }

    #[test]
    fn test_port_range() {
        assert!(ApplicationDescriptor::new("demo", "dev", "1.0", 0).is_err());
        assert!(ApplicationDescriptor::new("demo", "dev", "1.0", 65536).is_err());
        assert!(ApplicationDescriptor::new("demo", "dev", "1.0", -1).is_err());
        assert!(ApplicationDescriptor::new("demo", "dev", "1.0", 1).is_ok());
        assert!(ApplicationDescriptor::new("demo", "dev", "1.0", 65535).is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ApplicationDescriptor::parse("name: demo\nreplicas: 2\n", Some("dev"), None)
            .unwrap_err();
        assert!(matches!(err, DevError::Configuration(_)));
    }

    #[test]
    fn test_archive_name() {
        let app = ApplicationDescriptor::new("demo", "dev", "1.0", 8080).unwrap();
        assert_eq!(app.archive_name(), "demo-1.0.jar");
        let app = ApplicationDescriptor::new("orders", "dev", "2.3.1-SNAPSHOT", 8080).unwrap();
        assert_eq!(app.archive_name(), "orders-2.3.1-SNAPSHOT.jar");
    }

    #[test]
    fn test_selector_depends_only_on_name() {
        let a = ApplicationDescriptor::new("demo", "dev", "1.0", 8080).unwrap();
        let b = ApplicationDescriptor::new("demo", "other", "2.0", 9090).unwrap();
        let c = ApplicationDescriptor::new("demo2", "dev", "1.0", 8080).unwrap();
        assert_eq!(a.selector(), b.selector());
        assert_ne!(a.selector(), c.selector());
        assert_eq!(a.selector().to_string(), "app=demo,deploymentconfig=demo");
    }

    #[test]
    fn test_selector_matches() {
        let selector = LabelSelector::for_app("demo");
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "demo".to_string());
        assert!(!selector.matches(&labels));
        labels.insert("deploymentconfig".to_string(), "demo".to_string());
        labels.insert("extra".to_string(), "x".to_string());
        assert!(selector.matches(&labels));
        labels.insert("app".to_string(), "other".to_string());
        assert!(!selector.matches(&labels));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ApplicationDescriptor::load(&dir.path().join("MANIFEST"), Some("dev"), None)
            .unwrap_err();
        assert!(matches!(err, DevError::Configuration(_)));
    }
}
