//! Bundled configuration templates
//!
//! Templates are minijinja sources compiled into the binary. Rendering is
//! strict: a reference to an undefined variable is an error, never an empty
//! string.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

pub const UPSTART_AGENT: &str = "upstart-zabbix-agent.conf";
pub const AGENT_CONF: &str = "zabbix_agent.conf";
pub const AGENTD_CONF: &str = "zabbix_agentd.conf";
pub const OPENSTACK_CONF: &str = "zabbix_openstack.conf";
pub const BUCKET_STATS: &str = "zabbix_bucket_stats";

const BUNDLED: &[(&str, &str)] = &[
    (
        UPSTART_AGENT,
        include_str!("../templates/upstart-zabbix-agent.conf.j2"),
    ),
    (AGENT_CONF, include_str!("../templates/zabbix_agent.conf.j2")),
    (AGENTD_CONF, include_str!("../templates/zabbix_agentd.conf.j2")),
    (
        OPENSTACK_CONF,
        include_str!("../templates/zabbix_openstack.conf.j2"),
    ),
    (BUCKET_STATS, include_str!("../templates/zabbix_bucket_stats.j2")),
];

/// Named templates ready to render
#[derive(Debug)]
pub struct TemplateLibrary {
    env: Environment<'static>,
}

impl TemplateLibrary {
    /// Empty library with strict undefined handling
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Library with every template shipped in the binary
    pub fn bundled() -> Result<Self> {
        let mut library = Self::new();
        for &(name, source) in BUNDLED {
            library.add(name, source)?;
        }
        Ok(library)
    }

    pub fn add(&mut self, name: &'static str, source: &'static str) -> Result<()> {
        self.env
            .add_template(name, source)
            .with_context(|| format!("Failed to compile template {name}"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    pub fn render<S: Serialize>(&self, name: &str, vars: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("Unknown template {name}"))?;
        template
            .render(vars)
            .with_context(|| format!("Failed to render template {name}"))
    }
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::new()
    }
}
