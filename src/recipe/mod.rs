//! Recipes: functions that declare resources into a graph
//!
//! A recipe reads node attributes (and peer discovery where it needs the
//! cluster layout) and declares resources in the order they must converge.
//! It never touches the node itself; the executor does that.

use anyhow::{Context, Result};
use converge::{Attributes, PeerDiscovery, ResourceGraph};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::{NodeConfig, ServiceProvider};
use crate::resource::{Dpkg, FileAttrs, PackageManager, ServiceManager, Systemd, Upstart};
use crate::templates::TemplateLibrary;

pub mod monitoring_agent;

/// Backends and locations shared by every recipe in a run
#[derive(Debug)]
pub struct RecipeEnv {
    pub root: PathBuf,
    /// Where cookbook files are read from
    pub files_dir: PathBuf,
    pub manage_ownership: bool,
    pub services: Rc<dyn ServiceManager>,
    pub packages: Rc<dyn PackageManager>,
    pub templates: Rc<TemplateLibrary>,
}

impl RecipeEnv {
    /// Environment for a real run, with backends chosen by the node config
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let root = config.root();
        let services: Rc<dyn ServiceManager> = match config.run.service_provider {
            ServiceProvider::Upstart => Rc::new(Upstart::new(&root)),
            ServiceProvider::Systemd => Rc::new(Systemd),
        };
        let templates = TemplateLibrary::bundled().context("Failed to load bundled templates")?;

        Ok(Self {
            packages: Rc::new(Dpkg::new(&root)),
            files_dir: config.files_dir(),
            manage_ownership: config.run.manage_ownership,
            services,
            templates: Rc::new(templates),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A file in the cookbook files directory
    pub fn cookbook_file(&self, name: &str) -> PathBuf {
        self.files_dir.join(name)
    }

    /// `attrs` as this run can enforce them
    pub fn attrs(&self, attrs: FileAttrs) -> FileAttrs {
        if self.manage_ownership {
            attrs
        } else {
            attrs.without_ownership()
        }
    }
}

/// Declare every recipe's resources for this node
pub fn build_graph(
    env: &RecipeEnv,
    attributes: &Attributes,
    discovery: &dyn PeerDiscovery,
) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new();
    monitoring_agent::declare(&mut graph, env, attributes, discovery)?;
    log::debug!("Declared {} resources", graph.len());
    Ok(graph)
}
