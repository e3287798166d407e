//! Directory resource

use anyhow::{Context, Result, bail};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::fs;
use std::path::{Path, PathBuf};

use super::{FileAttrs, rooted};
use crate::accounts::Accounts;

/// A directory with managed mode and ownership
#[derive(Debug)]
pub struct Directory {
    path: String,
    target: PathBuf,
    attrs: FileAttrs,
    accounts: Accounts,
}

impl Directory {
    pub fn new(root: &Path, path: &str, attrs: FileAttrs) -> Self {
        Self {
            path: path.to_string(),
            target: rooted(root, path),
            attrs,
            accounts: Accounts::new(root),
        }
    }
}

impl Resource for Directory {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn name(&self) -> String {
        self.path.clone()
    }

    fn description(&self) -> String {
        format!("Create directory {}", self.path)
    }

    fn current_state(&self) -> Result<ResourceState> {
        if !self.target.exists() {
            return Ok(ResourceState::Absent);
        }
        if !self.target.is_dir() {
            return Ok(ResourceState::Modified {
                from: "not a directory".to_string(),
                to: format!("directory {}", self.attrs.desired()),
            });
        }
        let current = format!("directory {}", self.attrs.observed(&self.target, &self.accounts)?);
        let desired = format!("directory {}", self.attrs.desired());
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
        ResourceState::present(format!("directory {}", self.attrs.desired()))
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let existed = self.target.exists();
        if existed && !self.target.is_dir() {
            bail!("{} exists and is not a directory", self.target.display());
        }
        fs::create_dir_all(&self.target)
            .with_context(|| format!("Failed to create directory {}", self.target.display()))?;
        self.attrs.enforce(&self.target, &self.accounts)?;

        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}
