//! PP-OCR on ONNX Runtime.
//!
//! [`PaddleOcrEngine`] bundles text detection, line recognition and an
//! optional whole-page orientation classifier. It exposes three levels of
//! work: cheap region detection (orientation search), full recognition, and
//! recognition preceded by orientation classification.

mod cls;
mod det;
mod error;
mod preprocess;
mod rec;
mod threading;

pub use cls::{OrientationClassifier, PageOrientation};
pub use det::{DetOptions, TextBox, TextDetector};
pub use error::OcrError;
pub use preprocess::rotate_clockwise;
pub use rec::{RecognitionResult, TextRecognizer};
pub use threading::{ThreadSettings, INTER_THREADS_ENV, INTRA_THREADS_ENV};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrConfig {
    pub det_model_path: PathBuf,
    pub rec_model_path: PathBuf,
    /// Recognition dictionary, one symbol per line.
    pub dict_path: PathBuf,
    /// Document orientation classifier. Without it the engine reports 0°.
    #[serde(default)]
    pub cls_model_path: Option<PathBuf>,
    #[serde(default)]
    pub det_options: DetOptions,
}

/// One recognised text fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
    /// Relative coordinates, 0..1.
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

const MAX_REC_BATCH: usize = 16;
/// Fragments below this confidence are treated as noise.
const MIN_FRAGMENT_CONFIDENCE: f32 = 0.3;
/// Below this the classifier's verdict is ignored and the page kept as is.
const MIN_ORIENTATION_CONFIDENCE: f32 = 0.5;

pub struct PaddleOcrEngine {
    detector: TextDetector,
    recognizer: TextRecognizer,
    classifier: Option<OrientationClassifier>,
}

impl PaddleOcrEngine {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let missing = missing_models(config);
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            return Err(OcrError::ModelLoad(format!("missing: {}", list.join(", "))));
        }

        log::info!("[OCR] loading detection model: {}", config.det_model_path.display());
        let detector = TextDetector::new(&config.det_model_path, config.det_options)?;

        log::info!("[OCR] loading recognition model: {}", config.rec_model_path.display());
        let recognizer = TextRecognizer::new(&config.rec_model_path, &config.dict_path)?;

        let classifier = match &config.cls_model_path {
            Some(path) => {
                log::info!("[OCR] loading orientation model: {}", path.display());
                Some(OrientationClassifier::new(path)?)
            }
            None => None,
        };

        log::info!("[OCR] engine ready");
        Ok(Self {
            detector,
            recognizer,
            classifier,
        })
    }

    /// Text regions only.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        let start = Instant::now();
        let input = preprocess::prepare_det_input(img);
        let boxes = self.detector.detect(input, img.width(), img.height())?;
        log::debug!(
            "[OCR] detect: {} regions in {} ms",
            boxes.len(),
            start.elapsed().as_millis()
        );
        Ok(boxes)
    }

    /// Detect, then recognise each region. Fragments come back in reading order.
    pub fn recognize(&mut self, img: &DynamicImage) -> Result<Vec<OcrResult>, OcrError> {
        let boxes = self.detect(img)?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let crops: Vec<DynamicImage> = boxes
            .iter()
            .map(|b| preprocess::crop_text_region(img, &b.points))
            .collect();
        let recognised = self.run_rec_batches(&crops);

        let (w, h) = (img.width(), img.height());
        let results: Vec<OcrResult> = boxes
            .iter()
            .zip(recognised)
            .filter(|(_, r)| keep_fragment(r))
            .map(|(b, r)| OcrResult {
                text: r.text.trim().to_string(),
                confidence: r.confidence,
                bbox: points_to_bbox(&b.points, w, h),
            })
            .collect();

        log::debug!(
            "[OCR] recognise: {} fragments in {} ms",
            results.len(),
            start.elapsed().as_millis()
        );
        Ok(results)
    }

    /// `None` when no orientation model is configured.
    pub fn classify_orientation(
        &mut self,
        img: &DynamicImage,
    ) -> Result<Option<PageOrientation>, OcrError> {
        match self.classifier.as_mut() {
            Some(classifier) => {
                let orientation = classifier.classify(preprocess::prepare_cls_input(img))?;
                log::debug!(
                    "[OCR] orientation {}° ({:.2})",
                    orientation.rotation,
                    orientation.confidence
                );
                Ok(Some(orientation))
            }
            None => Ok(None),
        }
    }

    /// Classify the page orientation, rotate accordingly and recognise.
    /// Returns the clockwise rotation that was applied.
    pub fn recognize_oriented(
        &mut self,
        img: &DynamicImage,
    ) -> Result<(u32, Vec<OcrResult>), OcrError> {
        let rotation = match self.classify_orientation(img)? {
            Some(o) if o.confidence >= MIN_ORIENTATION_CONFIDENCE => o.rotation,
            _ => 0,
        };
        let results = if rotation == 0 {
            self.recognize(img)?
        } else {
            self.recognize(&rotate_clockwise(img, rotation))?
        };
        Ok((rotation, results))
    }

    pub fn has_orientation_model(&self) -> bool {
        self.classifier.is_some()
    }

    fn run_rec_batches(&mut self, crops: &[DynamicImage]) -> Vec<RecognitionResult> {
        let mut results = Vec::with_capacity(crops.len());
        for batch in preprocess::prepare_rec_batches(crops, MAX_REC_BATCH) {
            let batch_len = batch.shape()[0];
            match self.recognizer.recognize_batch(batch) {
                Ok(batch_results) => results.extend(batch_results),
                Err(e) => {
                    // One failing batch blanks its lines; the rest of the page survives.
                    log::warn!("[OCR] recognition batch failed: {}", e);
                    results.extend(std::iter::repeat_with(RecognitionResult::empty).take(batch_len));
                }
            }
        }
        results
    }
}

fn keep_fragment(r: &RecognitionResult) -> bool {
    !r.text.trim().is_empty() && r.confidence >= MIN_FRAGMENT_CONFIDENCE
}

fn points_to_bbox(points: &[[f32; 2]; 4], img_w: u32, img_h: u32) -> BBox {
    let min_x = points.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min);
    let max_x = points.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max);
    let min_y = points.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min);
    let max_y = points.iter().map(|p| p[1]).fold(f32::NEG_INFINITY, f32::max);
    let (w, h) = (img_w.max(1) as f32, img_h.max(1) as f32);

    BBox {
        x: min_x / w,
        y: min_y / h,
        w: (max_x - min_x) / w,
        h: (max_y - min_y) / h,
    }
}

/// Model files named by `config` that do not exist on disk.
pub fn missing_models(config: &OcrConfig) -> Vec<&Path> {
    let mut paths = vec![
        config.det_model_path.as_path(),
        config.rec_model_path.as_path(),
        config.dict_path.as_path(),
    ];
    if let Some(cls) = &config.cls_model_path {
        paths.push(cls.as_path());
    }
    paths.into_iter().filter(|p| !p.exists()).collect()
}

pub fn is_models_installed(config: &OcrConfig) -> bool {
    missing_models(config).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_to_bbox() {
        let points = [[10.0, 20.0], [100.0, 20.0], [100.0, 50.0], [10.0, 50.0]];
        let bbox = points_to_bbox(&points, 200, 100);
        assert!((bbox.x - 0.05).abs() < 0.001);
        assert!((bbox.y - 0.2).abs() < 0.001);
        assert!((bbox.w - 0.45).abs() < 0.001);
        assert!((bbox.h - 0.3).abs() < 0.001);
    }

    #[test]
    fn test_keep_fragment_filters_noise() {
        let ok = RecognitionResult {
            text: "AB123-456789".into(),
            confidence: 0.9,
        };
        let blank = RecognitionResult {
            text: "  ".into(),
            confidence: 0.9,
        };
        let weak = RecognitionResult {
            text: "x".into(),
            confidence: 0.1,
        };
        assert!(keep_fragment(&ok));
        assert!(!keep_fragment(&blank));
        assert!(!keep_fragment(&weak));
    }

    #[test]
    fn test_missing_models_reported() {
        let dir = tempfile::tempdir().unwrap();
        let det = dir.path().join("det.onnx");
        std::fs::write(&det, b"x").unwrap();
        let config = OcrConfig {
            det_model_path: det,
            rec_model_path: dir.path().join("rec.onnx"),
            dict_path: dir.path().join("dict.txt"),
            cls_model_path: None,
            det_options: DetOptions::default(),
        };
        assert_eq!(missing_models(&config).len(), 2);
        assert!(!is_models_installed(&config));
        assert!(PaddleOcrEngine::new(&config).is_err());
    }

    #[test]
    fn test_config_json_camel_case() {
        let json = r#"{"detModelPath":"d.onnx","recModelPath":"r.onnx","dictPath":"k.txt"}"#;
        let config: OcrConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.dict_path, PathBuf::from("k.txt"));
        assert!(config.cls_model_path.is_none());
        assert!((config.det_options.box_thresh - 0.5).abs() < 1e-6);
    }
}
