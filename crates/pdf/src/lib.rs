//! PDF artifact writing on lopdf.
//!
//! Three operations: turn a list of raster pages into a PDF, merge existing
//! PDFs, and repair a damaged PDF by a clean rewrite. Every write goes to a
//! temporary file next to the destination and is renamed over it only once
//! complete, so a failed write never leaves a truncated `dest`.

mod images;
mod merge;

pub use images::{fit_rect, write_image_pages, A4_HEIGHT_PT, A4_WIDTH_PT};
pub use merge::{merge_pdfs, repair_pdf};

use lopdf::Document;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("pdf error: {0}")]
    Lopdf(#[from] lopdf::Error),

    #[error("image error: {0}")]
    Image(String),

    #[error("nothing to write to {0}")]
    NothingToWrite(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a write produced and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub pages_written: usize,
    /// Inputs that could not be read, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

pub fn page_count(path: &Path) -> Result<usize, PdfError> {
    Ok(Document::load(path)?.get_pages().len())
}

/// Compress, then write `doc` to `dest` through a sibling temp file.
pub(crate) fn save_atomic(doc: &mut Document, dest: &Path) -> Result<(), PdfError> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    doc.compress();
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    doc.save_to(&mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| PdfError::Io(e.error))?;

    log::debug!("[PDF] saved {}", dest.display());
    Ok(())
}
