//! Loading a node: config, attributes, discovery and the declared graph

use anyhow::{Context as AnyhowContext, Result};
use converge::{Attributes, CachedDiscovery, PeerDiscovery, ResourceGraph};
use std::path::PathBuf;

use crate::config::NodeConfig;
use crate::paths;
use crate::recipe::{self, RecipeEnv};

/// A node ready to converge
pub struct Node {
    pub config_path: PathBuf,
    pub attributes: Attributes,
    /// Shared by recipes and the executor, so each role is looked up once
    pub discovery: CachedDiscovery<Box<dyn PeerDiscovery>>,
    pub env: RecipeEnv,
}

impl Node {
    pub fn load(config: Option<&str>) -> Result<Self> {
        let config_path = paths::node_config(config)?;
        let config = NodeConfig::load(&config_path)?;
        let attributes = config.attributes().context("Invalid node attributes")?;
        log::info!(
            "Loaded node {} from {}",
            attributes.hostname().unwrap_or("?"),
            config_path.display()
        );

        Ok(Self {
            env: RecipeEnv::from_config(&config)?,
            discovery: CachedDiscovery::new(config.discovery()),
            attributes,
            config_path,
        })
    }

    pub fn graph(&self) -> Result<ResourceGraph> {
        recipe::build_graph(&self.env, &self.attributes, &self.discovery)
            .context("Failed to declare resources")
    }
}
