//! Inputs and the page-sized units the pipeline works on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    /// Decided by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// A selected input, immutable once accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    /// Position in the selection.
    pub index: usize,
    pub path: PathBuf,
    pub kind: InputKind,
    /// File name without extension.
    pub stem: String,
}

impl InputFile {
    pub fn from_path(index: usize, path: &Path) -> Result<Self> {
        let kind = InputKind::from_path(path)
            .ok_or_else(|| PipelineError::render(path, "unsupported file type"))?;
        if !path.is_file() {
            return Err(PipelineError::render(path, "file not found"));
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            index,
            path: path.to_path_buf(),
            kind,
            stem,
        })
    }
}

/// One raster page, persisted as a PNG in the run workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUnit {
    pub source_index: usize,
    pub source_stem: String,
    pub page_index: usize,
    pub path: PathBuf,
    /// Clockwise degrees applied to the persisted image.
    pub rotation: u32,
    pub orientation_corrected: bool,
}

impl ImageUnit {
    pub fn new(source: &InputFile, page_index: usize, path: PathBuf) -> Self {
        Self {
            source_index: source.index,
            source_stem: source.stem.clone(),
            page_index,
            path,
            rotation: 0,
            orientation_corrected: false,
        }
    }

    /// e.g. `scan_03.pdf p2`
    pub fn label(&self) -> String {
        format!("{} p{}", self.source_stem, self.page_index + 1)
    }
}
