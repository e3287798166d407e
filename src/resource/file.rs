//! Cookbook file resource - ship a static file to the node

use anyhow::{Context, Result};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use super::{FileAttrs, file_details, probe_file, rooted, text_diff, write_file};
use crate::accounts::Accounts;

/// Where a cookbook file's bytes come from
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file in the files directory (large binaries, packages)
    Disk(PathBuf),
    /// Compiled into the binary
    Bundled {
        name: &'static str,
        content: &'static [u8],
    },
}

impl FileSource {
    fn read(&self) -> Result<Cow<'static, [u8]>> {
        match self {
            Self::Disk(path) => fs::read(path)
                .map(Cow::Owned)
                .with_context(|| format!("Failed to read cookbook file {}", path.display())),
            Self::Bundled { content, .. } => Ok(Cow::Borrowed(*content)),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Disk(path) => path.display().to_string(),
            Self::Bundled { name, .. } => format!("bundled {name}"),
        }
    }
}

/// A static file copied verbatim to `path`
#[derive(Debug)]
pub struct CookbookFile {
    path: String,
    target: PathBuf,
    source: FileSource,
    attrs: FileAttrs,
    accounts: Accounts,
}

impl CookbookFile {
    pub fn new(root: &Path, path: &str, source: FileSource, attrs: FileAttrs) -> Self {
        Self {
            path: path.to_string(),
            target: rooted(root, path),
            source,
            attrs,
            accounts: Accounts::new(root),
        }
    }
}

impl Resource for CookbookFile {
    fn kind(&self) -> &'static str {
        "cookbook_file"
    }

    fn name(&self) -> String {
        self.path.clone()
    }

    fn description(&self) -> String {
        format!("Copy {} to {}", self.source.label(), self.path)
    }

    fn current_state(&self) -> Result<ResourceState> {
        // An unreadable source cannot be compared; apply reports why
        let Ok(content) = self.source.read() else {
            return Ok(ResourceState::Unknown);
        };
        probe_file(&self.target, &content, &self.attrs, &self.accounts)
    }

    fn desired_state(&self) -> ResourceState {
        match self.source.read() {
            Ok(content) => ResourceState::present(file_details(&content, &self.attrs)),
            Err(_) => ResourceState::Present { details: None },
        }
    }

    fn content_diff(&self) -> Option<String> {
        let content = self.source.read().ok()?;
        text_diff(&self.target, &content)
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let content = self.source.read()?;
        write_file(&self.target, &content, &self.attrs, &self.accounts)
    }
}
