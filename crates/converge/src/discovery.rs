//! Peer discovery: "which nodes run role R"
//!
//! Backends may be expensive (a remote inventory), so runs go through
//! [`CachedDiscovery`], which resolves every role at most once.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;

/// Answers which nodes carry a role
pub trait PeerDiscovery {
    /// Node identifiers for `role`, in the backend's order
    fn find_nodes(&self, role: &str) -> Result<Vec<String>>;
}

impl<D: PeerDiscovery + ?Sized> PeerDiscovery for &D {
    fn find_nodes(&self, role: &str) -> Result<Vec<String>> {
        (**self).find_nodes(role)
    }
}

impl<D: PeerDiscovery + ?Sized> PeerDiscovery for Box<D> {
    fn find_nodes(&self, role: &str) -> Result<Vec<String>> {
        (**self).find_nodes(role)
    }
}

/// Fixed role table, e.g. from a node config file
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    roles: HashMap<String, Vec<String>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the nodes for a role
    pub fn with_role<I, S>(mut self, role: &str, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .insert(role.to_string(), nodes.into_iter().map(Into::into).collect());
        self
    }
}

impl From<HashMap<String, Vec<String>>> for StaticDiscovery {
    fn from(roles: HashMap<String, Vec<String>>) -> Self {
        Self { roles }
    }
}

impl PeerDiscovery for StaticDiscovery {
    fn find_nodes(&self, role: &str) -> Result<Vec<String>> {
        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}

/// Per-run cache in front of another backend
///
/// Successful lookups are remembered for the lifetime of the cache; failures
/// are not, so a later caller sees the backend error again.
#[derive(Debug)]
pub struct CachedDiscovery<D> {
    inner: D,
    cache: RefCell<HashMap<String, Vec<String>>>,
}

impl<D: PeerDiscovery> CachedDiscovery<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Roles resolved so far
    pub fn cached_roles(&self) -> Vec<String> {
        let mut roles: Vec<_> = self.cache.borrow().keys().cloned().collect();
        roles.sort();
        roles
    }

    /// Whether `node` carries `role`
    pub fn has_role(&self, node: &str, role: &str) -> Result<bool> {
        Ok(self.find_nodes(role)?.iter().any(|n| n == node))
    }
}

impl<D: PeerDiscovery> PeerDiscovery for CachedDiscovery<D> {
    fn find_nodes(&self, role: &str) -> Result<Vec<String>> {
        if let Some(nodes) = self.cache.borrow().get(role) {
            log::trace!("discovery cache hit for role {role}");
            return Ok(nodes.clone());
        }

        let nodes = self.inner.find_nodes(role)?;
        log::debug!("discovered {} node(s) for role {role}", nodes.len());
        self.cache
            .borrow_mut()
            .insert(role.to_string(), nodes.clone());
        Ok(nodes)
    }
}
