//! Service resource - keep a service enabled and running

use anyhow::{Context, Result};
use converge::{Action, ApplyContext, ApplyResult, Resource, ResourceState};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::runner;

/// A process supervisor
pub trait ServiceManager: fmt::Debug {
    fn is_enabled(&self, service: &str) -> Result<bool>;
    fn is_running(&self, service: &str) -> Result<bool>;
    fn enable(&self, service: &str) -> Result<()>;
    fn disable(&self, service: &str) -> Result<()>;
    fn start(&self, service: &str) -> Result<()>;
    fn stop(&self, service: &str) -> Result<()>;
    fn restart(&self, service: &str) -> Result<()>;
    fn reload(&self, service: &str) -> Result<()>;
}

/// Upstart jobs (`/etc/init/<name>.conf`)
///
/// A job is enabled unless an override file sets it to `manual`.
#[derive(Debug, Clone)]
pub struct Upstart {
    root: PathBuf,
    initctl: String,
}

impl Upstart {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            initctl: "initctl".to_string(),
        }
    }

    #[cfg(test)]
    fn with_initctl(mut self, initctl: impl Into<String>) -> Self {
        self.initctl = initctl.into();
        self
    }

    fn override_path(&self, service: &str) -> PathBuf {
        self.root.join(format!("etc/init/{service}.override"))
    }
}

/// Goal and state from `initctl status`, e.g. `zabbix-agent start/running, process 42`
fn parse_initctl_status(output: &str) -> Result<Option<(String, String)>> {
    let re = Regex::new(r"^\S+ (\w+)/([\w-]+)")?;
    Ok(re
        .captures(output.trim())
        .map(|c| (c[1].to_string(), c[2].to_string())))
}

/// `initctl: Unknown job: zabbix-agent`
fn is_unknown_job(stderr: &str) -> bool {
    stderr.contains("Unknown job")
}

impl ServiceManager for Upstart {
    fn is_enabled(&self, service: &str) -> Result<bool> {
        let path = self.override_path(service);
        if !path.exists() {
            return Ok(true);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(!content.lines().any(|l| l.trim() == "manual"))
    }

    fn is_running(&self, service: &str) -> Result<bool> {
        let args = ["status", service];
        let output = runner::run_output(&self.initctl, &args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // A job whose config is not installed yet is not running
            if is_unknown_job(&stderr) {
                log::debug!("initctl status {service}: {}", stderr.trim());
                return Ok(false);
            }
            return Err(runner::failure(&self.initctl, &args, &output));
        }
        let out = String::from_utf8_lossy(&output.stdout);
        Ok(matches!(
            parse_initctl_status(&out)?,
            Some((goal, state)) if goal == "start" && state == "running"
        ))
    }

    fn enable(&self, service: &str) -> Result<()> {
        let path = self.override_path(service);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    fn disable(&self, service: &str) -> Result<()> {
        let path = self.override_path(service);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, "manual\n").with_context(|| format!("Failed to write {}", path.display()))
    }

    fn start(&self, service: &str) -> Result<()> {
        runner::run_checked(&self.initctl, &["start", service])
    }

    fn stop(&self, service: &str) -> Result<()> {
        runner::run_checked(&self.initctl, &["stop", service])
    }

    fn restart(&self, service: &str) -> Result<()> {
        // `initctl restart` refuses stopped jobs
        if self.is_running(service)? {
            runner::run_checked(&self.initctl, &["restart", service])
        } else {
            self.start(service)
        }
    }

    fn reload(&self, service: &str) -> Result<()> {
        runner::run_checked(&self.initctl, &["reload", service])
    }
}

/// systemd units via systemctl
#[derive(Debug, Clone, Default)]
pub struct Systemd;

impl ServiceManager for Systemd {
    fn is_enabled(&self, service: &str) -> Result<bool> {
        // Non-zero covers disabled and unknown units; failing to run systemctl is an error
        let output = runner::run_output("systemctl", &["is-enabled", "--quiet", service])?;
        Ok(output.status.success())
    }

    fn is_running(&self, service: &str) -> Result<bool> {
        let output = runner::run_output("systemctl", &["is-active", "--quiet", service])?;
        Ok(output.status.success())
    }

    fn enable(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["enable", service])
    }

    fn disable(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["disable", service])
    }

    fn start(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["start", service])
    }

    fn stop(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["stop", service])
    }

    fn restart(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["restart", service])
    }

    fn reload(&self, service: &str) -> Result<()> {
        runner::run_checked("systemctl", &["reload", service])
    }
}

/// A service kept enabled and running
#[derive(Debug)]
pub struct Service {
    name: String,
    manager: Rc<dyn ServiceManager>,
}

impl Service {
    pub fn new(name: &str, manager: Rc<dyn ServiceManager>) -> Self {
        Self {
            name: name.to_string(),
            manager,
        }
    }

    fn describe(enabled: bool, running: bool) -> String {
        format!(
            "{}, {}",
            if enabled { "enabled" } else { "disabled" },
            if running { "running" } else { "stopped" }
        )
    }
}

impl Resource for Service {
    fn kind(&self) -> &'static str {
        "service"
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Enable and start {}", self.name)
    }

    fn current_state(&self) -> Result<ResourceState> {
        let enabled = self.manager.is_enabled(&self.name)?;
        let running = self.manager.is_running(&self.name)?;
        let current = Self::describe(enabled, running);
        if enabled && running {
            Ok(ResourceState::present(current))
        } else {
            Ok(ResourceState::Modified {
                from: current,
                to: Self::describe(true, true),
            })
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present(Self::describe(true, true))
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let mut changed = false;
        if !self.manager.is_enabled(&self.name)? {
            self.manager.enable(&self.name)?;
            changed = true;
        }
        if !self.manager.is_running(&self.name)? {
            self.manager.start(&self.name)?;
            changed = true;
        }
        Ok(if changed {
            ApplyResult::Modified
        } else {
            ApplyResult::NoChange
        })
    }

    fn supported_actions(&self) -> &'static [Action] {
        &[
            Action::Start,
            Action::Stop,
            Action::Restart,
            Action::Reload,
            Action::Enable,
            Action::Disable,
        ]
    }

    fn run_action(&self, action: Action, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let name = self.name.as_str();
        match action {
            Action::Converge => return self.apply(ctx),
            Action::Start => self.manager.start(name)?,
            Action::Stop => self.manager.stop(name)?,
            Action::Restart => self.manager.restart(name)?,
            Action::Reload => self.manager.reload(name)?,
            Action::Enable => self.manager.enable(name)?,
            Action::Disable => self.manager.disable(name)?,
        }
        Ok(ApplyResult::Modified)
    }
}
