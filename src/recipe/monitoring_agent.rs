//! Monitoring agent (zabbix) for every node of the cluster
//!
//! Installs the agent from a bundled tarball, runs it as an unprivileged
//! system user and renders its configuration. Head nodes additionally get
//! the OpenStack checks and the object store bucket scripts.
//!
//! Nothing is declared unless `bcpc.enabled.monitoring` is true.

use anyhow::Result;
use converge::{Action, Attributes, Declaration, Guard, PeerDiscovery, ResourceGraph, ResourceId, Timing};
use serde_json::json;

use super::RecipeEnv;
use crate::resource::{
    ArchiveInstall, CookbookFile, Directory, FileAttrs, FileSource, Package, Service, SystemUser,
    Template,
};
use crate::templates;

pub const SERVICE: &str = "zabbix-agent";

const AGENT_TARBALL: &str = "/tmp/zabbix-agent.tar.gz";
const AGENT_BINARY: &str = "/usr/local/sbin/zabbix_agentd";
const REQUESTS_AWS_DEB: &str = "/tmp/python-requests-aws_0.1.6_all.deb";
const DISCOVER_BUCKETS: &[u8] = include_bytes!("../../files/zabbix_discover_buckets");

/// Attribute paths read by this recipe
pub mod attr {
    pub const ENABLED: &str = "bcpc.enabled.monitoring";
    pub const USER: &str = "bcpc.zabbix.user";
    pub const GROUP: &str = "bcpc.zabbix.group";
    /// Address the agents report to; every agent config needs it
    pub const MANAGEMENT_VIP: &str = "bcpc.management.vip";
    pub const HEADNODE_ROLE: &str = "bcpc.roles.headnode";
    pub const MYSQL_ROLE: &str = "bcpc.roles.mysql";
}

pub fn service_id() -> ResourceId {
    ResourceId::new("service", SERVICE)
}

/// Declare the monitoring agent's resources
pub fn declare(
    graph: &mut ResourceGraph,
    env: &RecipeEnv,
    attributes: &Attributes,
    discovery: &dyn PeerDiscovery,
) -> Result<()> {
    if !attributes.bool_or(attr::ENABLED, false)? {
        log::info!("Monitoring disabled, declaring nothing");
        return Ok(());
    }

    let root = env.root();
    let user = attributes.require_str(attr::USER)?;
    let group = attributes.require_str(attr::GROUP)?;
    attributes.require_str(attr::MANAGEMENT_VIP)?;
    let headnode = attributes.str_or(attr::HEADNODE_ROLE, "headnode")?;
    let mysql_role = attributes.str_or(attr::MYSQL_ROLE, "mysql")?;

    let mysql_servers = discovery.find_nodes(mysql_role)?;
    let node = attributes.to_value();
    let hostname = attributes.hostname();
    let vars = json!({ "node": node, "hostname": hostname });
    let restart_later = |decl: Declaration| decl.notifies(Action::Restart, service_id(), Timing::Delayed);

    graph.declare(Declaration::new(CookbookFile::new(
        root,
        AGENT_TARBALL,
        FileSource::Disk(env.cookbook_file("bins/zabbix-agent.tar.gz")),
        env.attrs(FileAttrs::new(0o444).owner("root")),
    )))?;

    let install = ArchiveInstall::new(root, "install-zabbix-agent", AGENT_TARBALL, "/usr/local", AGENT_BINARY);
    let marker = install.marker().to_path_buf();
    graph.declare(
        Declaration::new(install)
            .not_if(format!("test -f {AGENT_BINARY}"), move |_| Ok(marker.is_file())),
    )?;

    graph.declare(Declaration::new(
        SystemUser::new(root, user, group).home("/var/log").shell("/bin/false"),
    ))?;

    graph.declare(Declaration::new(Directory::new(
        root,
        "/var/log/zabbix",
        env.attrs(FileAttrs::new(0o755).owner(user).group(group)),
    )))?;

    graph.declare(restart_later(Declaration::new(
        Template::new(
            root,
            "/etc/init/zabbix-agent.conf",
            templates::UPSTART_AGENT,
            env.templates.clone(),
            env.attrs(FileAttrs::new(0o644).owner("root").group("root")),
        )
        .variables(vars.clone()),
    )))?;

    graph.declare(restart_later(Declaration::new(
        Template::new(
            root,
            "/usr/local/etc/zabbix_agent.conf",
            templates::AGENT_CONF,
            env.templates.clone(),
            env.attrs(FileAttrs::new(0o600).owner(user).group("root")),
        )
        .variables(vars.clone()),
    )))?;

    graph.declare(restart_later(Declaration::new(
        Template::new(
            root,
            "/usr/local/etc/zabbix_agentd.conf",
            templates::AGENTD_CONF,
            env.templates.clone(),
            env.attrs(FileAttrs::new(0o600).owner(user).group("root")),
        )
        .variables(json!({ "node": node, "hostname": hostname, "mysql_servers": mysql_servers })),
    )))?;

    graph.declare(Declaration::new(Service::new(SERVICE, env.services.clone())))?;

    graph.declare(
        Declaration::new(
            Template::new(
                root,
                "/usr/local/etc/zabbix_agentd.conf.d/zabbix-openstack.conf",
                templates::OPENSTACK_CONF,
                env.templates.clone(),
                env.attrs(FileAttrs::new(0o600).owner(user).group("root")),
            )
            .variables(vars.clone()),
        )
        .guard(Guard::node_has_role(headnode))
        .notifies(Action::Restart, service_id(), Timing::Immediate),
    )?;

    graph.declare(Declaration::new(CookbookFile::new(
        root,
        REQUESTS_AWS_DEB,
        FileSource::Disk(env.cookbook_file("bins/python-requests-aws_0.1.6_all.deb")),
        env.attrs(FileAttrs::new(0o444).owner("root")),
    )))?;

    graph.declare(Declaration::new(Package::new(
        root,
        "requests-aws",
        REQUESTS_AWS_DEB,
        env.packages.clone(),
    )))?;

    graph.declare(
        Declaration::new(
            Template::new(
                root,
                "/usr/local/bin/zabbix_bucket_stats",
                templates::BUCKET_STATS,
                env.templates.clone(),
                env.attrs(FileAttrs::new(0o755).owner("root").group("root")),
            )
            .variables(vars),
        )
        .guard(Guard::node_has_role(headnode)),
    )?;

    graph.declare(
        Declaration::new(CookbookFile::new(
            root,
            "/usr/local/bin/zabbix_discover_buckets",
            FileSource::Bundled {
                name: "zabbix_discover_buckets",
                content: DISCOVER_BUCKETS,
            },
            env.attrs(FileAttrs::new(0o755).owner("root")),
        ))
        .guard(Guard::node_has_role(headnode)),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tests::fake_env;
    use crate::resource::archive::tests::tarball;
    use crate::resource::package::tests::FakePackages;
    use crate::resource::service::tests::FakeServices;
    use converge::{Outcome, RunReport, StaticDiscovery};
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    const HEAD_ONLY: [&str; 3] = [
        "template[/usr/local/etc/zabbix_agentd.conf.d/zabbix-openstack.conf]",
        "template[/usr/local/bin/zabbix_bucket_stats]",
        "cookbook_file[/usr/local/bin/zabbix_discover_buckets]",
    ];

    struct Node {
        root: TempDir,
        _files: TempDir,
        env: RecipeEnv,
        services: Rc<FakeServices>,
        packages: Rc<FakePackages>,
        attributes: Attributes,
        discovery: StaticDiscovery,
    }

    impl Node {
        fn new(hostname: &str, monitoring: bool) -> Self {
            let root = TempDir::new().unwrap();
            fs::create_dir_all(root.path().join("etc")).unwrap();
            fs::write(
                root.path().join("etc/passwd"),
                "root:x:0:0:root:/root:/bin/bash\nzabbix:x:998:4::/var/log:/bin/false\n",
            )
            .unwrap();
            fs::write(root.path().join("etc/group"), "root:x:0:\nadm:x:4:\n").unwrap();

            let files = TempDir::new().unwrap();
            fs::create_dir_all(files.path().join("bins")).unwrap();
            fs::write(
                files.path().join("bins/zabbix-agent.tar.gz"),
                tarball(&[("sbin/zabbix_agentd", b"#!/bin/sh\n")]),
            )
            .unwrap();
            fs::write(
                files.path().join("bins/python-requests-aws_0.1.6_all.deb"),
                b"!<arch>\n",
            )
            .unwrap();

            let (env, services, packages) = fake_env(root.path(), files.path());
            let attributes = Attributes::new()
                .with("hostname", hostname)
                .unwrap()
                .with(attr::ENABLED, monitoring)
                .unwrap()
                .with(attr::USER, "zabbix")
                .unwrap()
                .with(attr::GROUP, "adm")
                .unwrap()
                .with(attr::MANAGEMENT_VIP, "10.0.100.5")
                .unwrap();
            let discovery = StaticDiscovery::new()
                .with_role("headnode", ["head1", "head2"])
                .with_role("mysql", ["head1", "head2"]);

            Self {
                root,
                _files: files,
                env,
                services,
                packages,
                attributes,
                discovery,
            }
        }

        fn graph(&self) -> ResourceGraph {
            let mut graph = ResourceGraph::new();
            declare(&mut graph, &self.env, &self.attributes, &self.discovery).unwrap();
            graph
        }

        fn converge(&self) -> RunReport {
            converge::run_simple(&self.graph(), &self.attributes, &self.discovery).unwrap()
        }

        fn path(&self, node_path: &str) -> std::path::PathBuf {
            crate::resource::rooted(self.root.path(), node_path)
        }
    }

    fn outcome<'a>(report: &'a RunReport, id: &str) -> &'a Outcome {
        report.outcome(&id.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_monitoring_disabled_declares_nothing() {
        let node = Node::new("head1", false);
        assert!(node.graph().is_empty());

        let report = node.converge();
        assert!(report.resources().is_empty());
        assert!(node.services.calls.borrow().is_empty());
    }

    #[test]
    fn test_declaration_order() {
        let node = Node::new("head1", true);
        let ids: Vec<String> = node.graph().ids().map(ToString::to_string).collect();
        assert_eq!(
            ids,
            vec![
                "cookbook_file[/tmp/zabbix-agent.tar.gz]",
                "archive[install-zabbix-agent]",
                "user[zabbix]",
                "directory[/var/log/zabbix]",
                "template[/etc/init/zabbix-agent.conf]",
                "template[/usr/local/etc/zabbix_agent.conf]",
                "template[/usr/local/etc/zabbix_agentd.conf]",
                "service[zabbix-agent]",
                "template[/usr/local/etc/zabbix_agentd.conf.d/zabbix-openstack.conf]",
                "cookbook_file[/tmp/python-requests-aws_0.1.6_all.deb]",
                "package[requests-aws]",
                "template[/usr/local/bin/zabbix_bucket_stats]",
                "cookbook_file[/usr/local/bin/zabbix_discover_buckets]",
            ]
        );
    }

    #[test]
    fn test_head_node_full_converge() {
        let node = Node::new("head1", true);
        let report = node.converge();

        for id in HEAD_ONLY {
            assert!(outcome(&report, id).is_change(), "{id} should change");
        }
        assert!(node.path(AGENT_BINARY).is_file());
        assert!(node.path("/var/log/zabbix").is_dir());
        assert_eq!(node.packages.installs.borrow().len(), 1);

        // Existing account already matches
        assert_eq!(outcome(&report, "user[zabbix]"), &Outcome::Unchanged);

        let agentd = fs::read_to_string(node.path("/usr/local/etc/zabbix_agentd.conf")).unwrap();
        assert!(agentd.contains("head1,head2"));
        assert!(agentd.contains("Hostname=head1"));

        // One immediate restart from the openstack checks, one delayed for the
        // three agent configs
        assert_eq!(node.services.count("restart zabbix-agent"), 2);
        let timings: Vec<Timing> = report.notifications().iter().map(|n| n.timing).collect();
        assert_eq!(timings, vec![Timing::Immediate, Timing::Delayed]);
        assert_eq!(
            report.notifications()[1].source,
            "template[/etc/init/zabbix-agent.conf]".parse().unwrap()
        );
    }

    #[test]
    fn test_worker_node_skips_head_only_resources() {
        let node = Node::new("worker1", true);
        let report = node.converge();

        for id in HEAD_ONLY {
            assert!(outcome(&report, id).is_skipped(), "{id} should be skipped");
        }
        assert!(!node.path("/usr/local/bin/zabbix_bucket_stats").exists());
        assert!(!node.path("/usr/local/bin/zabbix_discover_buckets").exists());

        assert_eq!(node.services.count("restart zabbix-agent"), 1);
        assert_eq!(report.notifications().len(), 1);
        assert_eq!(report.notifications()[0].timing, Timing::Delayed);
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let node = Node::new("head1", true);
        node.converge();
        let restarts = node.services.count("restart zabbix-agent");

        let report = node.converge();
        assert_eq!(report.summary().changed, 0);
        assert!(report.notifications().is_empty());
        assert_eq!(node.services.count("restart zabbix-agent"), restarts);
        assert!(outcome(&report, "archive[install-zabbix-agent]").is_skipped());
    }

    #[test]
    fn test_config_change_restarts_once() {
        let node = Node::new("worker1", true);
        node.converge();

        let node = Node {
            attributes: node.attributes.clone().with(attr::MANAGEMENT_VIP, "10.0.100.6").unwrap(),
            ..node
        };
        let before = node.services.count("restart zabbix-agent");
        let report = node.converge();

        assert_eq!(node.services.count("restart zabbix-agent"), before + 1);
        assert_eq!(report.notifications().len(), 1);
    }

    #[test]
    fn test_installed_agent_is_not_unpacked_again() {
        let node = Node::new("worker1", true);
        let binary = node.path(AGENT_BINARY);
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, b"installed").unwrap();

        let report = node.converge();
        assert!(outcome(&report, "archive[install-zabbix-agent]").is_skipped());
        assert_eq!(fs::read(&binary).unwrap(), b"installed");
    }

    #[test]
    fn test_missing_user_attribute_fails_declaration() {
        let node = Node::new("head1", true);
        let attributes = Attributes::new().with(attr::ENABLED, true).unwrap();
        let mut graph = ResourceGraph::new();
        assert!(declare(&mut graph, &node.env, &attributes, &node.discovery).is_err());
    }

    #[test]
    fn test_missing_vip_fails_declaration() {
        let node = Node::new("head1", true);
        let attributes = Attributes::new()
            .with(attr::ENABLED, true)
            .unwrap()
            .with(attr::USER, "zabbix")
            .unwrap()
            .with(attr::GROUP, "adm")
            .unwrap();
        let mut graph = ResourceGraph::new();

        let err = declare(&mut graph, &node.env, &attributes, &node.discovery).unwrap_err();
        assert!(format!("{err:#}").contains(attr::MANAGEMENT_VIP));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let node = Node::new("head1", true);
        let opts = converge::ExecuteOptions {
            dry_run: true,
            verbose: false,
        };
        let report = converge::run(
            &node.graph(),
            &node.attributes,
            &node.discovery,
            &opts,
            &mut converge::NoProgress,
        )
        .unwrap();

        assert!(report.dry_run());
        assert!(report.summary().would_change > 0);
        assert!(!node.path("/etc/init/zabbix-agent.conf").exists());
        assert!(node.services.calls.borrow().is_empty());
    }
}
