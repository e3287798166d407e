//! Node configuration
//!
//! One file per node, TOML by default or JSON when the extension says so:
//!
//! ```toml
//! [node]
//! hostname = "head1"
//!
//! [run]
//! root = "/"
//! files_dir = "/var/lib/provision/files"
//! service_provider = "upstart"
//!
//! [discovery]
//! # http_url = "http://inventory:8080"
//! timeout_secs = 10
//!
//! [discovery.roles]
//! headnode = ["head1", "head2"]
//!
//! [attributes.bcpc.enabled]
//! monitoring = true
//!
//! [attributes.bcpc.management]
//! vip = "10.0.100.5"
//! ```

use anyhow::{Context, Result};
use converge::{Attributes, PeerDiscovery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    /// Nested node attributes handed to the recipe
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSection {
    /// Defaults to the system hostname
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Filesystem root every managed path is resolved under
    #[serde(default = "default_root")]
    pub root: String,
    /// Directory holding cookbook files (package archives and the like)
    #[serde(default = "default_files_dir")]
    pub files_dir: String,
    #[serde(default)]
    pub service_provider: ServiceProvider,
    /// Enforce file owners and groups (requires root)
    #[serde(default = "default_true")]
    pub manage_ownership: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            files_dir: default_files_dir(),
            service_provider: ServiceProvider::default(),
            manage_ownership: true,
        }
    }
}

fn default_root() -> String {
    "/".to_string()
}

fn default_files_dir() -> String {
    "/var/lib/provision/files".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProvider {
    #[default]
    Upstart,
    Systemd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Inventory service base URL; takes precedence over `roles`
    #[serde(default)]
    pub http_url: Option<String>,
    /// Limit on each inventory request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            http_url: None,
            timeout_secs: default_timeout_secs(),
            roles: BTreeMap::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    discovery::DEFAULT_TIMEOUT.as_secs()
}

impl NodeConfig {
    /// Load a node config, choosing the format by extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::parse(&content, path)?;
        log::debug!("Loaded node config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))
        } else {
            toml::from_str(content).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
    }

    pub fn root(&self) -> PathBuf {
        crate::paths::expand(&self.run.root)
    }

    pub fn files_dir(&self) -> PathBuf {
        crate::paths::expand(&self.run.files_dir)
    }

    /// Node attributes with the hostname filled in
    pub fn attributes(&self) -> Result<Attributes> {
        let hostname = match &self.node.hostname {
            Some(h) => h.clone(),
            None => system_hostname()?,
        };
        let attributes =
            Attributes::from_value(serde_json::Value::Object(self.attributes.clone()))?
                .with(converge::attributes::HOSTNAME, hostname)?;
        Ok(attributes)
    }

    pub fn discovery(&self) -> Box<dyn PeerDiscovery> {
        discovery::from_config(
            self.discovery.http_url.as_deref(),
            Duration::from_secs(self.discovery.timeout_secs),
            &self.discovery.roles,
        )
    }
}

/// Short hostname of this machine
pub fn system_hostname() -> Result<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("gethostname failed");
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let full = String::from_utf8_lossy(&buf[..end]);
    Ok(full.split('.').next().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[node]
hostname = "head1"

[run]
root = "/srv/node"
service_provider = "systemd"
manage_ownership = false

[discovery]
timeout_secs = 3

[discovery.roles]
headnode = ["head1", "head2"]

[attributes.bcpc.enabled]
monitoring = true

[attributes.bcpc.management]
vip = "10.0.100.5"

[attributes.bcpc.zabbix]
user = "zabbix"
group = "adm"
"#;

    #[test]
    fn test_parse_toml() {
        let config = NodeConfig::parse(SAMPLE, Path::new("node.toml")).unwrap();
        assert_eq!(config.root(), PathBuf::from("/srv/node"));
        assert_eq!(config.run.service_provider, ServiceProvider::Systemd);
        assert!(!config.run.manage_ownership);
        assert_eq!(config.run.files_dir, "/var/lib/provision/files");

        let attributes = config.attributes().unwrap();
        assert_eq!(attributes.hostname(), Some("head1"));
        assert!(attributes.bool_or("bcpc.enabled.monitoring", false).unwrap());
        assert_eq!(attributes.get_str("bcpc.zabbix.group").unwrap(), Some("adm"));

        assert_eq!(config.discovery.timeout_secs, 3);
        let discovery = config.discovery();
        assert_eq!(discovery.find_nodes("headnode").unwrap(), vec!["head1", "head2"]);
    }

    #[test]
    fn test_parse_json_by_extension() {
        let json = r#"{ "node": { "hostname": "worker1" }, "attributes": { "bcpc": { "enabled": { "monitoring": false } } } }"#;
        let config = NodeConfig::parse(json, Path::new("worker1.json")).unwrap();
        assert_eq!(config.run.root, "/");
        assert_eq!(config.run.service_provider, ServiceProvider::Upstart);
        assert!(config.run.manage_ownership);
        assert_eq!(config.attributes().unwrap().hostname(), Some("worker1"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NodeConfig::parse("", Path::new("node.toml")).unwrap();
        assert!(config.attributes.is_empty());
        assert!(config.discovery.http_url.is_none());
        assert_eq!(config.discovery.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_file_names_path() {
        let err = NodeConfig::parse("[run\n", Path::new("/etc/provision/node.toml")).unwrap_err();
        assert!(err.to_string().contains("/etc/provision/node.toml"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(NodeConfig::load(&path).unwrap().node.hostname.as_deref(), Some("head1"));
        assert!(NodeConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_system_hostname_is_short() {
        let hostname = system_hostname().unwrap();
        assert!(!hostname.contains('.'));
    }
}
