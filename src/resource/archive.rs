//! Archive install resource - unpack a tarball unless it is already installed

use anyhow::{Context, Result, bail};
use converge::{ApplyContext, ApplyResult, Resource, ResourceState};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;

use super::rooted;

/// Unpack a `.tar.gz` into a directory; `creates` marks it installed
#[derive(Debug)]
pub struct ArchiveInstall {
    name: String,
    archive: String,
    archive_path: PathBuf,
    dest: String,
    dest_path: PathBuf,
    creates: String,
    creates_path: PathBuf,
}

impl ArchiveInstall {
    pub fn new(root: &Path, name: &str, archive: &str, dest: &str, creates: &str) -> Self {
        Self {
            name: name.to_string(),
            archive: archive.to_string(),
            archive_path: rooted(root, archive),
            dest: dest.to_string(),
            dest_path: rooted(root, dest),
            creates: creates.to_string(),
            creates_path: rooted(root, creates),
        }
    }

    /// Rooted path of the marker file
    pub fn marker(&self) -> &Path {
        &self.creates_path
    }

    fn unpack(&self) -> Result<()> {
        let file = File::open(&self.archive_path)
            .with_context(|| format!("Failed to open archive {}", self.archive_path.display()))?;
        fs::create_dir_all(&self.dest_path)
            .with_context(|| format!("Failed to create {}", self.dest_path.display()))?;

        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive
            .unpack(&self.dest_path)
            .with_context(|| format!("Failed to extract {} into {}", self.archive, self.dest))
    }
}

impl Resource for ArchiveInstall {
    fn kind(&self) -> &'static str {
        "archive"
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Extract {} into {}", self.archive, self.dest)
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.creates_path.exists() {
            Ok(ResourceState::present(format!("{} present", self.creates)))
        } else {
            Ok(ResourceState::Absent)
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present(format!("{} present", self.creates))
    }

    fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
        self.unpack()?;
        if !self.creates_path.exists() {
            bail!(
                "Extracting {} did not produce {}",
                self.archive,
                self.creates
            );
        }
        Ok(ApplyResult::Created)
    }
}
