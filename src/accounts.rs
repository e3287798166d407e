//! Local account database lookups
//!
//! Reads `etc/passwd` and `etc/group` below the provisioning root instead of
//! asking libc, so a run against a chroot or a test tree sees that tree's
//! accounts.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

/// One `passwd` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

/// One `group` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
}

/// Account database rooted at a directory
#[derive(Debug, Clone)]
pub struct Accounts {
    root: PathBuf,
}

impl Accounts {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn passwd_path(&self) -> PathBuf {
        self.root.join("etc/passwd")
    }

    fn group_path(&self) -> PathBuf {
        self.root.join("etc/group")
    }

    /// All users; a missing database reads as empty
    pub fn users(&self) -> Result<Vec<PasswdEntry>> {
        read_lines(&self.passwd_path())?
            .iter()
            .map(|line| parse_passwd(line))
            .collect()
    }

    pub fn groups(&self) -> Result<Vec<GroupEntry>> {
        read_lines(&self.group_path())?
            .iter()
            .map(|line| parse_group(line))
            .collect()
    }

    pub fn user(&self, name: &str) -> Result<Option<PasswdEntry>> {
        Ok(self.users()?.into_iter().find(|u| u.name == name))
    }

    pub fn group(&self, name: &str) -> Result<Option<GroupEntry>> {
        Ok(self.groups()?.into_iter().find(|g| g.name == name))
    }

    /// Numeric uid for `name`, failing if the user does not exist
    pub fn uid(&self, name: &str) -> Result<u32> {
        self.user(name)?
            .map(|u| u.uid)
            .with_context(|| format!("Unknown user '{name}' in {}", self.passwd_path().display()))
    }

    pub fn gid(&self, name: &str) -> Result<u32> {
        self.group(name)?
            .map(|g| g.gid)
            .with_context(|| format!("Unknown group '{name}' in {}", self.group_path().display()))
    }

    pub fn user_name(&self, uid: u32) -> Result<Option<String>> {
        Ok(self
            .users()?
            .into_iter()
            .find(|u| u.uid == uid)
            .map(|u| u.name))
    }

    pub fn group_name(&self, gid: u32) -> Result<Option<String>> {
        Ok(self
            .groups()?
            .into_iter()
            .find(|g| g.gid == gid)
            .map(|g| g.name))
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        log::debug!("{} does not exist, treating as empty", path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn parse_passwd(line: &str) -> Result<PasswdEntry> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() != 7 {
        bail!("Malformed passwd entry: {line}");
    }
    Ok(PasswdEntry {
        name: fields[0].to_string(),
        uid: fields[2]
            .parse()
            .with_context(|| format!("Invalid uid in passwd entry: {line}"))?,
        gid: fields[3]
            .parse()
            .with_context(|| format!("Invalid gid in passwd entry: {line}"))?,
        home: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

fn parse_group(line: &str) -> Result<GroupEntry> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() != 4 {
        bail!("Malformed group entry: {line}");
    }
    Ok(GroupEntry {
        name: fields[0].to_string(),
        gid: fields[2]
            .parse()
            .with_context(|| format!("Invalid gid in group entry: {line}"))?,
    })
}
