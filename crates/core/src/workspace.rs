//! Per-run scratch directory, removed when the run ends on any path.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{PipelineError, Result};
use scansort_rules::sanitize_identifier;

pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    scratch_seq: u64,
}

impl Workspace {
    /// New directory under `parent`, or the system temp dir.
    pub fn acquire(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scansort-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::Workspace(e.to_string()))?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::Workspace(e.to_string()))?;

        let path = dir.path().to_path_buf();
        log::debug!("[Workspace] acquired {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            scratch_seq: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PNG location of one page, unique per (source, page).
    pub fn page_path(&self, source_index: usize, stem: &str, page_index: usize) -> PathBuf {
        self.path.join(format!(
            "{:04}_{}_page_{:04}.png",
            source_index,
            sanitize_identifier(stem),
            page_index
        ))
    }

    pub fn repaired_path(&self, source_index: usize) -> PathBuf {
        self.path.join(format!("{:04}_repaired.pdf", source_index))
    }

    /// A fresh scratch file name with the given extension.
    pub fn scratch_path(&mut self, extension: &str) -> PathBuf {
        self.scratch_seq += 1;
        self.path
            .join(format!("scratch_{:06}.{}", self.scratch_seq, extension))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => log::debug!("[Workspace] removed {}", self.path.display()),
                Err(e) => log::warn!("[Workspace] cannot remove {}: {}", self.path.display(), e),
            }
        }
    }
}
