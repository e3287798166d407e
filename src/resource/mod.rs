//! Concrete resources for node provisioning
//!
//! Every resource here implements [`converge::Resource`]:
//! - State detection (current vs desired), never touching the system
//! - Apply function (converge current → desired)
//!
//! Paths are declared as absolute node paths (`/etc/init/...`) and resolved
//! below a provisioning root, which is `/` in production and a scratch tree
//! in tests.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::accounts::Accounts;

pub mod archive;
pub mod directory;
pub mod file;
pub mod package;
pub mod service;
pub mod template;
pub mod user;

pub use archive::ArchiveInstall;
pub use directory::Directory;
pub use file::{CookbookFile, FileSource};
pub use package::{Dpkg, Package, PackageManager};
pub use service::{Service, ServiceManager, Systemd, Upstart};
pub use template::Template;
pub use user::SystemUser;

/// Resolve an absolute node path below `root`
pub fn rooted(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Permission bits and ownership a managed path should have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub mode: u32,
    /// `None` leaves the owner alone
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl FileAttrs {
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            owner: None,
            group: None,
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Drop ownership so only the mode is managed
    pub fn without_ownership(mut self) -> Self {
        self.owner = None;
        self.group = None;
        self
    }

    /// Canonical description compared between probe and desired state
    fn describe(&self, owner: Option<&str>, group: Option<&str>, mode: u32) -> String {
        let mut out = format!("mode {mode:04o}");
        match (owner, group) {
            (Some(o), Some(g)) => out.push_str(&format!(" owner {o}:{g}")),
            (Some(o), None) => out.push_str(&format!(" owner {o}")),
            (None, Some(g)) => out.push_str(&format!(" group {g}")),
            (None, None) => {}
        }
        out
    }

    /// How the path should look
    pub fn desired(&self) -> String {
        self.describe(self.owner.as_deref(), self.group.as_deref(), self.mode)
    }

    /// How the path looks, restricted to the attributes this value manages
    pub fn observed(&self, path: &Path, accounts: &Accounts) -> Result<String> {
        use std::os::unix::fs::MetadataExt;

        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let owner = match self.owner {
            Some(_) => Some(
                accounts
                    .user_name(meta.uid())?
                    .unwrap_or_else(|| meta.uid().to_string()),
            ),
            None => None,
        };
        let group = match self.group {
            Some(_) => Some(
                accounts
                    .group_name(meta.gid())?
                    .unwrap_or_else(|| meta.gid().to_string()),
            ),
            None => None,
        };
        Ok(self.describe(
            owner.as_deref(),
            group.as_deref(),
            meta.permissions().mode() & 0o7777,
        ))
    }

    /// Set mode and ownership on an existing path
    pub fn enforce(&self, path: &Path, accounts: &Accounts) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
            .with_context(|| format!("Failed to set mode on {}", path.display()))?;

        if self.owner.is_none() && self.group.is_none() {
            return Ok(());
        }
        let uid = self.owner.as_deref().map(|o| accounts.uid(o)).transpose()?;
        let gid = self.group.as_deref().map(|g| accounts.gid(g)).transpose()?;
        std::os::unix::fs::chown(path, uid, gid)
            .with_context(|| format!("Failed to change ownership of {}", path.display()))
    }
}

/// Content digest used in file state details
pub fn digest(content: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(content).to_hex())
}

/// Desired details of a managed file with `content`
pub fn file_details(content: &[u8], attrs: &FileAttrs) -> String {
    format!("{} {}", digest(content), attrs.desired())
}

/// Probe a managed file against the content it should hold
pub fn probe_file(
    path: &Path,
    content: &[u8],
    attrs: &FileAttrs,
    accounts: &Accounts,
) -> Result<converge::ResourceState> {
    if !path.exists() {
        return Ok(converge::ResourceState::Absent);
    }
    let actual = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let current = format!("{} {}", digest(&actual), attrs.observed(path, accounts)?);
    let desired = file_details(content, attrs);

    if current == desired {
        Ok(converge::ResourceState::present(desired))
    } else {
        Ok(converge::ResourceState::Modified {
            from: current,
            to: desired,
        })
    }
}

/// Write `content` to `path` (if it differs) and enforce attributes
pub fn write_file(
    path: &Path,
    content: &[u8],
    attrs: &FileAttrs,
    accounts: &Accounts,
) -> Result<converge::ApplyResult> {
    let existed = path.exists();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    let same = existed && fs::read(path).is_ok_and(|actual| actual == content);
    if !same {
        // Write next to the target and rename so readers never see half a file
        let staging = path.with_extension("provision-tmp");
        fs::write(&staging, content)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        let placed = attrs.enforce(&staging, accounts).and_then(|()| {
            fs::rename(&staging, path)
                .with_context(|| format!("Failed to move {} into place", path.display()))
        });
        if let Err(e) = placed {
            if let Err(cleanup) = fs::remove_file(&staging) {
                log::warn!("Failed to remove {}: {cleanup}", staging.display());
            }
            return Err(e);
        }
    } else {
        attrs.enforce(path, accounts)?;
    }

    Ok(if existed {
        converge::ApplyResult::Modified
    } else {
        converge::ApplyResult::Created
    })
}

/// Unified diff between the file at `path` and `new`, `None` if identical
/// or either side is not text
pub fn text_diff(path: &Path, new: &[u8]) -> Option<String> {
    let new = std::str::from_utf8(new).ok()?;
    let old = if path.exists() {
        fs::read_to_string(path).ok()?
    } else {
        String::new()
    };
    if old == new {
        return None;
    }
    let label = path.display().to_string();
    let diff = similar::TextDiff::from_lines(old.as_str(), new);
    Some(
        diff.unified_diff()
            .context_radius(3)
            .header(&label, &label)
            .to_string(),
    )
}
