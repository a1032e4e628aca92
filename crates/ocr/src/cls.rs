//! Whole-page orientation classifier (PP-LCNet doc_ori, 4 classes).

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::error::OcrError;
use crate::threading::apply_session_threads;

/// Class index to the clockwise rotation that brings the page upright.
const CLASS_ANGLES: [u32; 4] = [0, 90, 180, 270];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageOrientation {
    /// Clockwise degrees to apply, one of 0/90/180/270.
    pub rotation: u32,
    pub confidence: f32,
}

pub struct OrientationClassifier {
    session: Session,
}

impl OrientationClassifier {
    pub fn new(model_path: &Path) -> Result<Self, OcrError> {
        let builder = Session::builder()
            .map_err(|e: ort::Error| OcrError::ModelLoad(e.to_string()))?;
        let builder = apply_session_threads(builder)
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?;
        let session = builder.commit_from_file(model_path).map_err(|e| {
            OcrError::ModelLoad(format!("orientation model {}: {}", model_path.display(), e))
        })?;
        Ok(Self { session })
    }

    pub fn classify(&mut self, input: Array4<f32>) -> Result<PageOrientation, OcrError> {
        let input_tensor =
            Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| OcrError::Inference(format!("orientation: {}", e)))?;
        let output_view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?;
        let scores: Vec<f32> = output_view.iter().copied().collect();
        drop(outputs);

        pick_orientation(&scores)
    }
}

/// Accepts raw logits or probabilities; softmax is applied when the scores
/// do not already sum to one.
pub(crate) fn pick_orientation(scores: &[f32]) -> Result<PageOrientation, OcrError> {
    if scores.len() < CLASS_ANGLES.len() {
        return Err(OcrError::Inference(format!(
            "orientation output has {} classes, expected {}",
            scores.len(),
            CLASS_ANGLES.len()
        )));
    }
    let scores = &scores[..CLASS_ANGLES.len()];

    let sum: f32 = scores.iter().sum();
    let probs: Vec<f32> = if (sum - 1.0).abs() < 1e-3 && scores.iter().all(|p| *p >= 0.0) {
        scores.to_vec()
    } else {
        softmax(scores)
    };

    let (idx, confidence) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    Ok(PageOrientation {
        rotation: CLASS_ANGLES[idx],
        confidence,
    })
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
