//! Artifact writer contract and its lopdf implementation.

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub use scansort_pdf::WriteReport;

/// All writes replace `dest` atomically.
pub trait ArtifactWriter: Send {
    /// One normalised page per image, in order.
    fn write_pages(&self, images: &[PathBuf], dest: &Path) -> Result<WriteReport>;

    /// Concatenate existing artifacts; `dest` may be one of `sources`.
    fn merge_artifacts(&self, sources: &[PathBuf], dest: &Path) -> Result<WriteReport>;

    /// Clean rewrite of a damaged input document.
    fn repair(&self, src: &Path, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfWriter;

impl ArtifactWriter for PdfWriter {
    fn write_pages(&self, images: &[PathBuf], dest: &Path) -> Result<WriteReport> {
        scansort_pdf::write_image_pages(images, dest)
            .map_err(|e| PipelineError::Merge(format!("{}: {}", dest.display(), e)))
    }

    fn merge_artifacts(&self, sources: &[PathBuf], dest: &Path) -> Result<WriteReport> {
        scansort_pdf::merge_pdfs(sources, dest)
            .map_err(|e| PipelineError::Merge(format!("{}: {}", dest.display(), e)))
    }

    fn repair(&self, src: &Path, dest: &Path) -> Result<()> {
        scansort_pdf::repair_pdf(src, dest)
            .map(|_| ())
            .map_err(|e| PipelineError::render(src, format!("repair failed: {}", e)))
    }
}
