//! In-memory collaborators for pipeline tests.

use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::artifact::{ArtifactWriter, PdfWriter, WriteReport};
use crate::cancel::CancellationToken;
use crate::engine::{DetectedRegion, OcrBackend, TextFragment};
use crate::error::{PipelineError, Result};
use crate::source::Rasterizer;

pub const MARKER: [u8; 3] = [0, 0, 0];
pub const RED: [u8; 3] = [220, 30, 30];
pub const GREEN: [u8; 3] = [30, 200, 30];
pub const BLUE: [u8; 3] = [30, 30, 220];
pub const GREY: [u8; 3] = [128, 128, 128];

pub fn solid(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)))
}

/// Solid image whose top-left pixel is the orientation marker.
pub fn marked(w: u32, h: u32, color: [u8; 3]) -> DynamicImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb(color));
    img.put_pixel(0, 0, Rgb(MARKER));
    DynamicImage::ImageRgb8(img)
}

pub fn save_png(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn centre_colour(img: &DynamicImage) -> [u8; 3] {
    let rgb = img.to_rgb8();
    rgb.get_pixel(rgb.width() / 2, rgb.height() / 2).0
}

/// Reads text off an image by its centre colour. Detection sees strong text
/// only when the marker sits top-left; unmarked images have no regions.
#[derive(Default)]
pub struct FakeOcr {
    texts: HashMap<[u8; 3], String>,
    pub recognize_calls: Arc<AtomicUsize>,
    pub detect_calls: Arc<AtomicUsize>,
    cancel_at: Option<(usize, CancellationToken)>,
    fail_detect: bool,
    fail_recognize: bool,
    reported_rotation: u32,
}

impl FakeOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, color: [u8; 3], text: &str) -> Self {
        self.texts.insert(color, text.to_string());
        self
    }

    /// Cancel `token` during the `n`th recognise call (1-based).
    pub fn cancel_on_call(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((n, token));
        self
    }

    pub fn failing_detect(mut self) -> Self {
        self.fail_detect = true;
        self
    }

    pub fn failing_recognize(mut self) -> Self {
        self.fail_recognize = true;
        self
    }

    pub fn reporting_rotation(mut self, rotation: u32) -> Self {
        self.reported_rotation = rotation;
        self
    }
}

impl OcrBackend for FakeOcr {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedRegion>> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_detect {
            return Err(PipelineError::Recognition("detector exploded".into()));
        }
        let rgb = image.to_rgb8();
        let top_left = rgb.get_pixel(0, 0).0;
        let has_marker = rgb.pixels().any(|p| p.0 == MARKER);
        Ok(if top_left == MARKER {
            vec![DetectedRegion { confidence: 0.9 }; 3]
        } else if has_marker {
            vec![DetectedRegion { confidence: 0.2 }]
        } else {
            Vec::new()
        })
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>> {
        let call = self.recognize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_at {
            if call == *n {
                token.cancel();
            }
        }
        if self.fail_recognize {
            return Err(PipelineError::Recognition("recogniser exploded".into()));
        }
        Ok(self
            .texts
            .get(&centre_colour(image))
            .map(|t| {
                t.split(' ')
                    .map(|word| TextFragment {
                        text: word.to_string(),
                        confidence: 0.9,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn recognize_oriented(&mut self, image: &DynamicImage) -> Result<(u32, Vec<TextFragment>)> {
        let fragments = self.recognize(image)?;
        Ok((self.reported_rotation, fragments))
    }
}

/// Renders a "pdf" whose content is a lookup key. Content starting with
/// `BROKEN` fails until repaired by [`RepairingWriter`].
#[derive(Default)]
pub struct FakeRasterizer {
    documents: HashMap<String, Vec<DynamicImage>>,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, key: &str, pages: Vec<DynamicImage>) -> Self {
        self.documents.insert(key.to_string(), pages);
        self
    }
}

impl Rasterizer for FakeRasterizer {
    fn render(&self, pdf: &Path) -> Result<Vec<DynamicImage>> {
        let content = std::fs::read_to_string(pdf).map_err(|e| PipelineError::render(pdf, e))?;
        if content.starts_with("BROKEN") {
            return Err(PipelineError::render(pdf, "damaged xref"));
        }
        self.documents
            .get(content.trim())
            .cloned()
            .ok_or_else(|| PipelineError::render(pdf, "unknown document"))
    }
}

pub fn fake_pdf(dir: &Path, name: &str, key: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, key).unwrap();
    path
}

/// Real PDF output; "repair" strips the `BROKEN` prefix.
#[derive(Default)]
pub struct RepairingWriter {
    inner: PdfWriter,
    pub repairs: Arc<AtomicUsize>,
}

impl ArtifactWriter for RepairingWriter {
    fn write_pages(&self, images: &[PathBuf], dest: &Path) -> Result<WriteReport> {
        self.inner.write_pages(images, dest)
    }

    fn merge_artifacts(&self, sources: &[PathBuf], dest: &Path) -> Result<WriteReport> {
        self.inner.merge_artifacts(sources, dest)
    }

    fn repair(&self, src: &Path, dest: &Path) -> Result<()> {
        self.repairs.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(src).map_err(|e| PipelineError::render(src, e))?;
        match content.strip_prefix("BROKEN") {
            Some(fixed) => std::fs::write(dest, fixed).map_err(|e| PipelineError::render(src, e)),
            None => Err(PipelineError::render(src, "not repairable")),
        }
    }
}

/// Pixel width of the image on each page of a written artifact.
pub fn page_widths(path: &Path) -> Vec<i64> {
    use lopdf::{Document, Object};
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let resources = match page.get(b"Resources").unwrap() {
                Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
                Object::Dictionary(dict) => dict,
                other => panic!("unexpected resources {:?}", other),
            };
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            stream.dict.get(b"Width").unwrap().as_i64().unwrap()
        })
        .collect()
}
