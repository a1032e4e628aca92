//! PDF rasterisation through pdfium.
//!
//! Every page of a document becomes one RGB image at the configured DPI.
//! The pdfium library is bound per call, so a [`PdfiumRasterizer`] is only a
//! pair of settings and can move freely between threads.

use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_DPI: u32 = 200;
/// Longest rendered side, whatever the page size and DPI.
const MAX_RENDER_SIDE: f32 = 8000.0;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("pdfium library unavailable: {0}")]
    Library(String),

    #[error("cannot open {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("page {index}: {reason}")]
    Page { index: usize, reason: String },

    #[error("document has no pages: {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    pub dpi: u32,
    /// Directory holding the pdfium shared library. Falls back to the
    /// executable's directory, `./libs` and finally the system library.
    pub library_dir: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            library_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    options: RenderOptions,
}

impl PdfiumRasterizer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render all pages in document order.
    pub fn render(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, RenderError> {
        let pdfium = bind_pdfium(self.options.library_dir.as_deref())?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| RenderError::Load {
                path: pdf_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let (target_w, target_h) =
                target_size(page.width().value, page.height().value, self.options.dpi);
            log::debug!(
                "[Render] {} page {}: {}x{} px",
                pdf_path.display(),
                index,
                target_w,
                target_h
            );

            let config = PdfRenderConfig::new()
                .set_target_width(target_w)
                .set_target_height(target_h);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| RenderError::Page {
                    index,
                    reason: e.to_string(),
                })?;
            pages.push(DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8()));
        }

        if pages.is_empty() {
            return Err(RenderError::Empty(pdf_path.to_path_buf()));
        }
        log::info!("[Render] {}: {} pages", pdf_path.display(), pages.len());
        Ok(pages)
    }
}

/// Pixel size for a page of `width_pt` x `height_pt` points at `dpi`.
pub fn target_size(width_pt: f32, height_pt: f32, dpi: u32) -> (i32, i32) {
    let mut scale = dpi.max(1) as f32 / 72.0;
    let longest = width_pt.max(height_pt) * scale;
    if longest > MAX_RENDER_SIDE {
        scale *= MAX_RENDER_SIDE / longest;
    }
    (
        ((width_pt * scale) as i32).max(1),
        ((height_pt * scale) as i32).max(1),
    )
}

fn search_paths(library_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = library_dir {
        paths.push(dir.to_path_buf());
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());
        }
    }
    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium, RenderError> {
    for path in search_paths(library_dir) {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::debug!("[Render] pdfium loaded from {:?}", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| RenderError::Library(e.to_string()))
}
