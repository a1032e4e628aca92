//! Text region detection (DBNet).
//!
//! The detector only answers "where is text and how sure are we", which is
//! all the orientation search needs. Recognition runs separately on the crops.

use ndarray::{Array2, Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::OcrError;
use crate::threading::apply_session_threads;

/// Post-processing thresholds for the probability map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetOptions {
    /// Pixel probability above which a pixel counts as text.
    pub thresh: f32,
    /// Minimum mean probability for a connected region to be kept.
    pub box_thresh: f32,
    /// Minimum region side, in model input pixels.
    pub min_size: f32,
    pub unclip_ratio: f32,
}

impl Default for DetOptions {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.5,
            min_size: 5.0,
            unclip_ratio: 1.6,
        }
    }
}

pub struct TextDetector {
    session: Session,
    options: DetOptions,
}

/// A detected text region in original image coordinates.
#[derive(Debug, Clone)]
pub struct TextBox {
    /// Corners clockwise from top-left.
    pub points: [[f32; 2]; 4],
    pub score: f32,
}

impl TextDetector {
    pub fn new(model_path: &Path, options: DetOptions) -> Result<Self, OcrError> {
        let builder = Session::builder()
            .map_err(|e: ort::Error| OcrError::ModelLoad(e.to_string()))?;
        let builder = apply_session_threads(builder)
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?;
        let session = builder.commit_from_file(model_path).map_err(|e| {
            OcrError::ModelLoad(format!("detection model {}: {}", model_path.display(), e))
        })?;

        Ok(Self { session, options })
    }

    pub fn detect(
        &mut self,
        input: Array4<f32>,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<TextBox>, OcrError> {
        let input_h = input.shape()[2] as u32;
        let input_w = input.shape()[3] as u32;

        let input_tensor =
            Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| OcrError::Inference(format!("detection: {}", e)))?;

        // Copy out so the session borrow ends before post-processing.
        let output_view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?;
        let prob_map = output_view.to_owned();
        drop(outputs);

        let scale = (
            orig_w as f32 / input_w.max(1) as f32,
            orig_h as f32 / input_h.max(1) as f32,
        );
        find_boxes(&prob_map.view(), &self.options, scale)
    }
}

/// Threshold the probability map, flood-fill connected regions and turn each
/// surviving region into an axis-aligned, unclipped box scaled by `scale`.
pub(crate) fn find_boxes(
    prob_map: &ArrayViewD<f32>,
    options: &DetOptions,
    scale: (f32, f32),
) -> Result<Vec<TextBox>, OcrError> {
    let shape = prob_map.shape().to_vec();
    let (h, w) = match shape.len() {
        4 => (shape[2], shape[3]),
        3 => (shape[1], shape[2]),
        _ => {
            return Err(OcrError::Inference(format!(
                "unexpected detection output shape: {:?}",
                shape
            )))
        }
    };
    let prob = |y: usize, x: usize| -> f32 {
        if shape.len() == 4 {
            prob_map[[0, 0, y, x]]
        } else {
            prob_map[[0, y, x]]
        }
    };

    let mut binary = Array2::<bool>::from_elem((h, w), false);
    for y in 0..h {
        for x in 0..w {
            binary[[y, x]] = prob(y, x) > options.thresh;
        }
    }

    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut boxes = Vec::new();
    let (scale_x, scale_y) = scale;

    for start_y in 0..h {
        for start_x in 0..w {
            if !binary[[start_y, start_x]] || visited[[start_y, start_x]] {
                continue;
            }

            let (mut min_x, mut max_x, mut min_y, mut max_y) = (start_x, start_x, start_y, start_y);
            let mut score_sum = 0.0f32;
            let mut count = 0usize;
            let mut stack = vec![(start_x, start_y)];
            visited[[start_y, start_x]] = true;

            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                score_sum += prob(y, x);
                count += 1;

                let neighbours = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx < w && ny < h && binary[[ny, nx]] && !visited[[ny, nx]] {
                        visited[[ny, nx]] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            let box_w = (max_x - min_x) as f32;
            let box_h = (max_y - min_y) as f32;
            if box_w < options.min_size || box_h < options.min_size {
                continue;
            }
            let score = score_sum / count as f32;
            if score < options.box_thresh {
                continue;
            }

            let expand_w = box_w * (options.unclip_ratio - 1.0) / 2.0;
            let expand_h = box_h * (options.unclip_ratio - 1.0) / 2.0;
            let x1 = (min_x as f32 - expand_w).max(0.0) * scale_x;
            let y1 = (min_y as f32 - expand_h).max(0.0) * scale_y;
            let x2 = (max_x as f32 + expand_w).min(w as f32 - 1.0) * scale_x;
            let y2 = (max_y as f32 + expand_h).min(h as f32 - 1.0) * scale_y;

            boxes.push(TextBox {
                points: [[x1, y1], [x2, y1], [x2, y2], [x1, y2]],
                score,
            });
        }
    }

    sort_reading_order(&mut boxes);
    Ok(boxes)
}

/// Top-to-bottom, then left-to-right for boxes on the same line.
fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| a.points[0][1].total_cmp(&b.points[0][1]));
    for i in 1..boxes.len() {
        let mut j = i;
        while j > 0
            && same_line(&boxes[j - 1], &boxes[j])
            && boxes[j].points[0][0] < boxes[j - 1].points[0][0]
        {
            boxes.swap(j - 1, j);
            j -= 1;
        }
    }
}

fn same_line(a: &TextBox, b: &TextBox) -> bool {
    let line_h = (a.points[2][1] - a.points[0][1])
        .min(b.points[2][1] - b.points[0][1])
        .max(1.0);
    (a.points[0][1] - b.points[0][1]).abs() < line_h / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn map_with_blocks(h: usize, w: usize, blocks: &[(usize, usize, usize, usize, f32)]) -> Array4<f32> {
        let mut map = Array4::<f32>::zeros((1, 1, h, w));
        for &(y0, x0, y1, x1, p) in blocks {
            for y in y0..y1 {
                for x in x0..x1 {
                    map[[0, 0, y, x]] = p;
                }
            }
        }
        map
    }

    #[test]
    fn test_single_region_detected() {
        let map = map_with_blocks(64, 64, &[(10, 10, 30, 50, 0.9)]);
        let boxes = find_boxes(&map.view().into_dyn(), &DetOptions::default(), (1.0, 1.0)).unwrap();
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].score - 0.9).abs() < 1e-5);
        let [tl, _, br, _] = boxes[0].points;
        assert!(tl[0] < 10.0 && tl[1] < 10.0);
        assert!(br[0] > 49.0 && br[1] > 29.0);
    }

    #[test]
    fn test_low_score_and_tiny_regions_dropped() {
        let map = map_with_blocks(64, 64, &[(5, 5, 20, 40, 0.4), (40, 40, 43, 43, 0.95)]);
        let boxes = find_boxes(&map.view().into_dyn(), &DetOptions::default(), (1.0, 1.0)).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_boxes_scaled_and_ordered() {
        let map = map_with_blocks(
            64,
            64,
            &[(40, 5, 55, 30, 0.8), (5, 35, 20, 60, 0.8), (5, 2, 20, 30, 0.8)],
        );
        let boxes = find_boxes(&map.view().into_dyn(), &DetOptions::default(), (2.0, 2.0)).unwrap();
        assert_eq!(boxes.len(), 3);
        assert!(boxes[0].points[0][0] < boxes[1].points[0][0]);
        assert!(boxes[2].points[0][1] > boxes[1].points[0][1]);
        assert!(boxes[2].points[2][1] > 100.0);
    }

    #[test]
    fn test_unexpected_shape_is_error() {
        let map = ndarray::Array2::<f32>::zeros((4, 4));
        assert!(find_boxes(&map.view().into_dyn(), &DetOptions::default(), (1.0, 1.0)).is_err());
    }
}
