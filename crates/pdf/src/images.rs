//! Raster pages to PDF: one A4 page per image, fitted and centred.

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

use crate::{save_atomic, PdfError, WriteReport};

pub const A4_WIDTH_PT: f32 = 595.0;
pub const A4_HEIGHT_PT: f32 = 842.0;

const JPEG_QUALITY: u8 = 85;

/// Placement `(x, y, w, h)` in points of a `img_w` x `img_h` image scaled to
/// fit an A4 page with its aspect ratio kept and centred.
pub fn fit_rect(img_w: u32, img_h: u32) -> (f32, f32, f32, f32) {
    let (iw, ih) = (img_w.max(1) as f32, img_h.max(1) as f32);
    let scale = (A4_WIDTH_PT / iw).min(A4_HEIGHT_PT / ih);
    let (w, h) = (iw * scale, ih * scale);
    ((A4_WIDTH_PT - w) / 2.0, (A4_HEIGHT_PT - h) / 2.0, w, h)
}

/// Write `images` as consecutive A4 pages of a new PDF at `dest`.
///
/// Unreadable images are skipped and reported. If none can be read the
/// destination is left untouched and `NothingToWrite` is returned.
pub fn write_image_pages(images: &[PathBuf], dest: &Path) -> Result<WriteReport, PdfError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());
    let mut report = WriteReport::default();

    for path in images {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("[PDF] skipping unreadable page {}: {}", path.display(), e);
                report.skipped.push((path.clone(), e.to_string()));
                continue;
            }
        };
        let page_id = add_image_page(&mut doc, pages_id, &img)?;
        kids.push(page_id.into());
        report.pages_written += 1;
    }

    if kids.is_empty() {
        return Err(PdfError::NothingToWrite(dest.to_path_buf()));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal("scansort"),
    });
    doc.trailer.set("Info", info_id);

    save_atomic(&mut doc, dest)?;
    log::info!(
        "[PDF] wrote {} ({} pages, {} skipped)",
        dest.display(),
        report.pages_written,
        report.skipped.len()
    );
    Ok(report)
}

fn add_image_page(
    doc: &mut Document,
    pages_id: lopdf::ObjectId,
    img: &DynamicImage,
) -> Result<lopdf::ObjectId, PdfError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(|e| PdfError::Image(e.to_string()))?;

    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    let image_id = doc.add_object(image_stream);

    let (x, y, w, h) = fit_rect(width, height);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), A4_WIDTH_PT.into(), A4_HEIGHT_PT.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
        "Contents" => content_id,
    });
    Ok(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_count;
    use crate::test_support::{page_image_widths, png};

    #[test]
    fn test_fit_rect_portrait_and_landscape() {
        let (x, y, w, h) = fit_rect(595, 842);
        assert!(x.abs() < 0.01 && y.abs() < 0.01);
        assert!((w - 595.0).abs() < 0.01 && (h - 842.0).abs() < 0.01);

        let (x, y, w, h) = fit_rect(2000, 1000);
        assert!((w - 595.0).abs() < 0.01);
        assert!((h - 297.5).abs() < 0.01);
        assert!(x.abs() < 0.01);
        assert!((y - (842.0 - 297.5) / 2.0).abs() < 0.01);
    }

    #[test]
    fn test_write_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            png(dir.path(), "a.png", 30, 40),
            png(dir.path(), "b.png", 50, 40),
            png(dir.path(), "c.png", 70, 40),
        ];
        let dest = dir.path().join("out").join("group.pdf");

        let report = write_image_pages(&images, &dest).unwrap();
        assert_eq!(report.pages_written, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(page_count(&dest).unwrap(), 3);
        assert_eq!(page_image_widths(&dest), vec![30, 50, 70]);
    }

    #[test]
    fn test_corrupt_image_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();
        let images = vec![png(dir.path(), "a.png", 20, 20), bad.clone()];
        let dest = dir.path().join("g.pdf");

        let report = write_image_pages(&images, &dest).unwrap();
        assert_eq!(report.pages_written, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, bad);
        assert_eq!(page_count(&dest).unwrap(), 1);
    }

    #[test]
    fn test_nothing_readable_leaves_dest_alone() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"junk").unwrap();
        let dest = dir.path().join("g.pdf");

        let err = write_image_pages(&[bad], &dest).unwrap_err();
        assert!(matches!(err, PdfError::NothingToWrite(_)));
        assert!(!dest.exists());
    }
}
