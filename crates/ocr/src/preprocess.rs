//! Tensor preparation for the PP-OCR models.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{s, Array3, Array4, Axis};

/// Detection input: longest side capped, shortest side floored, both multiples of 32.
pub const DET_LIMIT_SIDE: u32 = 960;
pub const DET_LIMIT_MIN: u32 = 32;

pub const REC_IMAGE_HEIGHT: u32 = 48;
pub const REC_IMAGE_WIDTH: u32 = 320;

pub const CLS_RESIZE_SHORT: u32 = 256;
pub const CLS_CROP: u32 = 224;

const CROP_PAD_RATIO: f32 = 0.04;

/// PaddleOCR det/rec normalisation: (x/255 - 0.5) / 0.5, BGR channel order.
const PADDLE_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const PADDLE_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// ImageNet statistics used by the orientation classifier (RGB order).
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn prepare_det_input(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let (orig_w, orig_h) = (rgb.width(), rgb.height());

    let ratio = calculate_det_ratio(orig_w, orig_h);
    let new_w = ((orig_w as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);
    let new_h = ((orig_h as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);

    let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);
    normalize_bgr(&resized, PADDLE_MEAN, PADDLE_STD).insert_axis(Axis(0))
}

/// Fixed-height crops, right-padded with grey to `REC_IMAGE_WIDTH`, in
/// batches of at most `batch_size`.
pub fn prepare_rec_batches(images: &[DynamicImage], batch_size: usize) -> Vec<Array4<f32>> {
    images
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut batch = Array4::<f32>::zeros((
                chunk.len(),
                3,
                REC_IMAGE_HEIGHT as usize,
                REC_IMAGE_WIDTH as usize,
            ));
            for (i, img) in chunk.iter().enumerate() {
                let rgb = img.to_rgb8();
                let ratio = REC_IMAGE_HEIGHT as f32 / rgb.height().max(1) as f32;
                let new_w = ((rgb.width() as f32 * ratio) as u32).clamp(1, REC_IMAGE_WIDTH);
                let resized =
                    image::imageops::resize(&rgb, new_w, REC_IMAGE_HEIGHT, FilterType::Triangle);

                let mut padded: RgbImage = ImageBuffer::from_pixel(
                    REC_IMAGE_WIDTH,
                    REC_IMAGE_HEIGHT,
                    Rgb([127, 127, 127]),
                );
                image::imageops::overlay(&mut padded, &resized, 0, 0);

                batch
                    .slice_mut(s![i, .., .., ..])
                    .assign(&normalize_bgr(&padded, PADDLE_MEAN, PADDLE_STD));
            }
            batch
        })
        .collect()
}

/// Shorter side to `CLS_RESIZE_SHORT`, centre crop `CLS_CROP` square.
pub fn prepare_cls_input(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width().max(1), rgb.height().max(1));
    let ratio = CLS_RESIZE_SHORT as f32 / w.min(h) as f32;
    let new_w = ((w as f32 * ratio).round() as u32).max(CLS_CROP);
    let new_h = ((h as f32 * ratio).round() as u32).max(CLS_CROP);
    let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

    let x0 = (new_w - CLS_CROP) / 2;
    let y0 = (new_h - CLS_CROP) / 2;
    let cropped = image::imageops::crop_imm(&resized, x0, y0, CLS_CROP, CLS_CROP).to_image();

    let mut tensor = Array3::<f32>::zeros((3, CLS_CROP as usize, CLS_CROP as usize));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            tensor[[c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor.insert_axis(Axis(0))
}

pub(crate) fn calculate_det_ratio(w: u32, h: u32) -> f32 {
    let max_side = w.max(h).max(1) as f32;
    let min_side = w.min(h).max(1) as f32;

    let mut ratio = 1.0f32;
    if max_side > DET_LIMIT_SIDE as f32 {
        ratio = DET_LIMIT_SIDE as f32 / max_side;
    }
    if min_side * ratio < DET_LIMIT_MIN as f32 {
        ratio = DET_LIMIT_MIN as f32 / min_side;
    }
    ratio
}

fn normalize_bgr(img: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x]] = (pixel[2] as f32 / 255.0 - mean[0]) / std[0];
        tensor[[1, y, x]] = (pixel[1] as f32 / 255.0 - mean[1]) / std[1];
        tensor[[2, y, x]] = (pixel[0] as f32 / 255.0 - mean[2]) / std[2];
    }
    tensor
}

/// Crop a detected region with a small margin, clamped to the image.
pub fn crop_text_region(img: &DynamicImage, box_points: &[[f32; 2]; 4]) -> DynamicImage {
    let min_x = box_points.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min).max(0.0) as i32;
    let min_y = box_points.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min).max(0.0) as i32;
    let max_x = box_points.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max) as i32;
    let max_y = box_points.iter().map(|p| p[1]).fold(f32::NEG_INFINITY, f32::max) as i32;

    let width = (max_x - min_x).max(1);
    let height = (max_y - min_y).max(1);
    let pad_x = (width as f32 * CROP_PAD_RATIO).round() as i32;
    let pad_y = (height as f32 * CROP_PAD_RATIO).round() as i32;

    let img_w = img.width() as i32;
    let img_h = img.height() as i32;

    let x0 = (min_x - pad_x).clamp(0, (img_w - 1).max(0));
    let y0 = (min_y - pad_y).clamp(0, (img_h - 1).max(0));
    let x1 = (max_x + pad_x).min(img_w).max(x0 + 1);
    let y1 = (max_y + pad_y).min(img_h).max(y0 + 1);

    img.crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
}

/// Rotate clockwise by a multiple of 90 degrees; other angles are a no-op.
pub fn rotate_clockwise(img: &DynamicImage, degrees: u32) -> DynamicImage {
    match degrees % 360 {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img.clone(),
    }
}
