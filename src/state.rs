//! Run state on disk: the per-node run lock and the last run report

use anyhow::{Context, Result};
use converge::RunReport;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCK_FILE: &str = "run.lock";
const LAST_RUN_FILE: &str = "last-run.json";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run holds {path} (pid {pid}); remove the file if that run is gone")]
    Held { path: PathBuf, pid: String },

    #[error("failed to create run lock {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive marker that a run is in progress on this node
///
/// Removed when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, LockError> {
        let path = state_dir.join(LOCK_FILE);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(state_dir).map_err(io_err)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).map_err(io_err)?;
                log::debug!("Acquired run lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let pid = fs::read_to_string(&path)
                    .map(|p| p.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                Err(LockError::Held { path, pid })
            }
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove run lock {}: {}", self.path.display(), e);
        }
    }
}

/// A persisted run: the report plus where it came from
#[derive(Debug, Serialize, Deserialize)]
pub struct LastRun {
    pub config: PathBuf,
    /// Error that aborted the run, if any
    #[serde(default)]
    pub error: Option<String>,
    pub report: RunReport,
}

impl LastRun {
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;
        let path = state_dir.join(LAST_RUN_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Saved run report to {}", path.display());
        Ok(())
    }

    /// The last saved run, if there is one
    pub fn load(state_dir: &Path) -> Result<Option<Self>> {
        let path = state_dir.join(LAST_RUN_FILE);
        if !path.exists() {
            log::debug!("No run report at {}", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let last = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(last))
    }
}
