//! Peer discovery backends
//!
//! The engine only sees [`converge::PeerDiscovery`]; this module provides the
//! inventory-service backend and picks a backend from the node config.

use anyhow::{Context, Result};
use converge::{PeerDiscovery, StaticDiscovery};
use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound on an inventory response
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Whole-request limit when the config does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inventory service answering `GET {base}/roles/{role}` with a JSON array
/// of node names
#[derive(Debug)]
pub struct HttpDiscovery {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpDiscovery {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.into(),
        }
    }

    fn role_url(&self, role: &str) -> String {
        format!("{}/roles/{}", self.base_url.trim_end_matches('/'), role)
    }
}

impl PeerDiscovery for HttpDiscovery {
    fn find_nodes(&self, role: &str) -> Result<Vec<String>> {
        let url = self.role_url(role);
        log::debug!("Discovering nodes for role {role} from {url}");

        let mut response = self
            .agent
            .get(url.as_str())
            .header("User-Agent", "provision")
            .header("Accept", "application/json")
            .call()
            .with_context(|| format!("Inventory request failed: {url}"))?;

        let nodes: Vec<String> = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_SIZE)
            .read_json()
            .with_context(|| format!("Invalid inventory response from {url}"))?;

        log::debug!("Role {role}: {}", nodes.join(", "));
        Ok(nodes)
    }
}

/// Discovery backend for a node: the inventory service if configured,
/// otherwise the static role table
pub fn from_config(
    http_url: Option<&str>,
    timeout: Duration,
    roles: &BTreeMap<String, Vec<String>>,
) -> Box<dyn PeerDiscovery> {
    match http_url {
        Some(url) => Box::new(HttpDiscovery::new(url, timeout)),
        None => {
            let discovery = roles
                .iter()
                .fold(StaticDiscovery::new(), |d, (role, nodes)| {
                    d.with_role(role, nodes.iter().cloned())
                });
            Box::new(discovery)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_url() {
        let discovery = HttpDiscovery::new("http://inventory:8080/", DEFAULT_TIMEOUT);
        assert_eq!(
            discovery.role_url("headnode"),
            "http://inventory:8080/roles/headnode"
        );
    }

    #[test]
    fn test_unreachable_inventory_is_an_error() {
        // Port 9 (discard) is closed on test machines
        let discovery = HttpDiscovery::new("http://127.0.0.1:9", DEFAULT_TIMEOUT);
        let err = discovery.find_nodes("headnode").unwrap_err();
        assert!(err.to_string().contains("Inventory request failed"));
    }

    #[test]
    fn test_silent_inventory_times_out() {
        // The kernel completes the handshake from the backlog; nothing ever replies
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let discovery = HttpDiscovery::new(url, Duration::from_millis(500));

        let started = std::time::Instant::now();
        let err = discovery.find_nodes("headnode").unwrap_err();
        assert!(err.to_string().contains("Inventory request failed"));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }

    #[test]
    fn test_static_roles_from_config() {
        let mut roles = BTreeMap::new();
        roles.insert(
            "headnode".to_string(),
            vec!["head1".to_string(), "head2".to_string()],
        );
        let discovery = from_config(None, DEFAULT_TIMEOUT, &roles);
        assert_eq!(discovery.find_nodes("headnode").unwrap(), vec!["head1", "head2"]);
        assert!(discovery.find_nodes("mysql").unwrap().is_empty());
    }
}
