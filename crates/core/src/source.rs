//! Rasterizer contract and its pdfium implementation.

use image::DynamicImage;
use scansort_render::PdfiumRasterizer;
use std::path::Path;

use crate::error::{PipelineError, Result};

pub trait Rasterizer: Send {
    /// All pages of `pdf`, in order. Errors are `Render`.
    fn render(&self, pdf: &Path) -> Result<Vec<DynamicImage>>;
}

impl Rasterizer for PdfiumRasterizer {
    fn render(&self, pdf: &Path) -> Result<Vec<DynamicImage>> {
        PdfiumRasterizer::render(self, pdf).map_err(|e| PipelineError::render(pdf, e))
    }
}
