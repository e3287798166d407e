//! System user resource (useradd/usermod)

use anyhow::{Result, bail};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::accounts::Accounts;
use crate::runner;

const USER_NAME: &str = r"^[a-z_][a-z0-9_-]{0,31}$";

/// A local account
#[derive(Debug)]
pub struct SystemUser {
    pub name: String,
    pub home: String,
    pub shell: String,
    /// Primary group name
    pub group: String,
    pub system: bool,
    root: PathBuf,
    accounts: Accounts,
}

impl SystemUser {
    pub fn new(root: &Path, name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            home: "/".to_string(),
            shell: "/bin/false".to_string(),
            group: group.to_string(),
            system: true,
            root: root.to_path_buf(),
            accounts: Accounts::new(root),
        }
    }

    pub fn home(mut self, home: &str) -> Self {
        self.home = home.to_string();
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_string();
        self
    }

    fn details(&self, home: &str, shell: &str, group: &str) -> String {
        format!("home {home} shell {shell} group {group}")
    }

    fn root_args(&self) -> Vec<String> {
        if self.root == Path::new("/") {
            Vec::new()
        } else {
            vec!["--root".to_string(), self.root.display().to_string()]
        }
    }

    /// Arguments creating the account
    fn useradd_args(&self) -> Vec<String> {
        let mut args = self.root_args();
        if self.system {
            args.push("--system".into());
        }
        args.extend([
            "--home-dir".into(),
            self.home.clone(),
            "--no-create-home".into(),
            "--shell".into(),
            self.shell.clone(),
            "--gid".into(),
            self.group.clone(),
            self.name.clone(),
        ]);
        args
    }

    /// Arguments correcting an existing account
    fn usermod_args(&self) -> Vec<String> {
        let mut args = self.root_args();
        args.extend([
            "--home".into(),
            self.home.clone(),
            "--shell".into(),
            self.shell.clone(),
            "--gid".into(),
            self.group.clone(),
            self.name.clone(),
        ]);
        args
    }
}

impl Resource for SystemUser {
    fn kind(&self) -> &'static str {
        "user"
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Create system user {}", self.name)
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(entry) = self.accounts.user(&self.name)? else {
            return Ok(ResourceState::Absent);
        };
        let group = self
            .accounts
            .group_name(entry.gid)?
            .unwrap_or_else(|| entry.gid.to_string());
        let current = self.details(&entry.home, &entry.shell, &group);
        let desired = self.details(&self.home, &self.shell, &self.group);

        if current == desired {
            Ok(ResourceState::present(desired))
        } else {
            Ok(ResourceState::Modified {
                from: current,
                to: desired,
            })
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present(self.details(&self.home, &self.shell, &self.group))
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if !Regex::new(USER_NAME)?.is_match(&self.name) {
            bail!("Invalid user name '{}'", self.name);
        }

        let exists = self.accounts.user(&self.name)?.is_some();
        let (cmd, args, result) = if exists {
            ("usermod", self.usermod_args(), ApplyResult::Modified)
        } else {
            ("useradd", self.useradd_args(), ApplyResult::Created)
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        runner::run_checked(cmd, &args)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seeded_root(passwd: &str) -> TempDir {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join("etc/passwd"), passwd).unwrap();
        fs::write(root.path().join("etc/group"), "root:x:0:\nadm:x:4:\n").unwrap();
        root
    }

    #[test]
    fn test_absent_user() {
        let root = seeded_root("root:x:0:0:root:/root:/bin/bash\n");
        let user = SystemUser::new(root.path(), "zabbix", "adm").home("/var/log");
        assert_eq!(user.current_state().unwrap(), ResourceState::Absent);
        assert_eq!(user.id().to_string(), "user[zabbix]");
    }

    #[test]
    fn test_matching_user_is_present() {
        let root = seeded_root("zabbix:x:112:4::/var/log:/bin/false\n");
        let user = SystemUser::new(root.path(), "zabbix", "adm").home("/var/log");
        assert_eq!(user.current_state().unwrap(), user.desired_state());
    }

    #[test]
    fn test_drifted_shell_is_modified() {
        let root = seeded_root("zabbix:x:112:4::/var/log:/bin/bash\n");
        let user = SystemUser::new(root.path(), "zabbix", "adm").home("/var/log");
        match user.current_state().unwrap() {
            ResourceState::Modified { from, to } => {
                assert!(from.contains("/bin/bash"));
                assert!(to.contains("/bin/false"));
            }
            other => panic!("expected Modified, got {other:?}"),
        }
    }

    #[test]
    fn test_useradd_arguments() {
        let root = seeded_root("");
        let user = SystemUser::new(root.path(), "zabbix", "adm").home("/var/log");
        let args = user.useradd_args();
        assert_eq!(args[0], "--root");
        assert!(args.contains(&"--system".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("zabbix"));

        let host = SystemUser::new(Path::new("/"), "zabbix", "adm");
        assert_eq!(host.usermod_args()[0], "--home");
    }

    #[test]
    fn test_invalid_name_rejected_before_running_anything() {
        let root = seeded_root("");
        let user = SystemUser::new(root.path(), "Bad Name", "adm");
        let err = user.apply(&mut ApplyContext::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid user name"));
    }
}
