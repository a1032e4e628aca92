//! Text line recognition (CRNN + CTC).

use ndarray::{Array4, ArrayView2, Axis};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::error::OcrError;
use crate::threading::apply_session_threads;

pub struct TextRecognizer {
    session: Session,
    charset: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

impl TextRecognizer {
    pub fn new(model_path: &Path, dict_path: &Path) -> Result<Self, OcrError> {
        let builder = Session::builder()
            .map_err(|e: ort::Error| OcrError::ModelLoad(e.to_string()))?;
        let builder = apply_session_threads(builder)
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?;
        let session = builder.commit_from_file(model_path).map_err(|e| {
            OcrError::ModelLoad(format!("recognition model {}: {}", model_path.display(), e))
        })?;

        let content = std::fs::read_to_string(dict_path)
            .map_err(|e| OcrError::Charset(format!("{}: {}", dict_path.display(), e)))?;
        let charset = parse_charset(&content)?;
        log::info!("[OCR] charset loaded: {} symbols", charset.len());

        Ok(Self { session, charset })
    }

    /// Recognise a `[N, 3, H, W]` batch of normalised line crops.
    pub fn recognize_batch(
        &mut self,
        input: Array4<f32>,
    ) -> Result<Vec<RecognitionResult>, OcrError> {
        let input_tensor =
            Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| OcrError::Inference(format!("recognition: {}", e)))?;

        let output_view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?;
        let output = output_view.to_owned();
        drop(outputs);

        let output = output
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| OcrError::Inference(format!("recognition output: {}", e)))?;

        Ok(output
            .axis_iter(Axis(0))
            .map(|seq| decode_ctc(&seq, &self.charset))
            .collect())
    }
}

/// One symbol per line; PaddleOCR dictionaries omit the space, which the
/// model still predicts as the last class.
pub(crate) fn parse_charset(content: &str) -> Result<Vec<String>, OcrError> {
    let mut charset: Vec<String> = content
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if charset.is_empty() {
        return Err(OcrError::Charset("dictionary is empty".to_string()));
    }
    if !charset.iter().any(|c| c == " ") {
        charset.push(" ".to_string());
    }
    Ok(charset)
}

/// Greedy CTC decode of one `[seq_len, classes]` probability sequence.
/// Class 0 is the blank; class `i` maps to `charset[i - 1]`.
pub(crate) fn decode_ctc(probs: &ArrayView2<f32>, charset: &[String]) -> RecognitionResult {
    let mut text = String::new();
    let mut confidence_sum = 0.0f32;
    let mut char_count = 0usize;
    let mut last_idx: Option<usize> = None;

    for step in probs.axis_iter(Axis(0)) {
        let (max_idx, max_prob) = step
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        if max_idx != 0 && Some(max_idx) != last_idx {
            if let Some(symbol) = charset.get(max_idx - 1) {
                text.push_str(symbol);
                confidence_sum += max_prob;
                char_count += 1;
            }
        }
        last_idx = Some(max_idx);
    }

    let confidence = if char_count > 0 {
        confidence_sum / char_count as f32
    } else {
        0.0
    };
    RecognitionResult { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn one_hot(steps: &[(usize, f32)], classes: usize) -> Array2<f32> {
        let mut probs = Array2::<f32>::zeros((steps.len(), classes));
        for (t, &(c, p)) in steps.iter().enumerate() {
            probs[[t, c]] = p;
        }
        probs
    }

    #[test]
    fn test_decode_collapses_repeats_and_blanks() {
        let charset: Vec<String> = ["A", "B", "1"].iter().map(|s| s.to_string()).collect();
        // A A _ A B B 1 -> "AAB1"
        let probs = one_hot(
            &[(1, 0.9), (1, 0.9), (0, 0.8), (1, 0.7), (2, 0.8), (2, 0.8), (3, 1.0)],
            4,
        );
        let r = decode_ctc(&probs.view(), &charset);
        assert_eq!(r.text, "AAB1");
        assert!((r.confidence - (0.9 + 0.7 + 0.8 + 1.0) / 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_all_blank_is_empty() {
        let charset = vec!["A".to_string()];
        let probs = one_hot(&[(0, 0.99), (0, 0.99)], 2);
        assert_eq!(decode_ctc(&probs.view(), &charset), RecognitionResult::empty());
    }

    #[test]
    fn test_decode_ignores_out_of_range_class() {
        let charset = vec!["A".to_string()];
        let probs = one_hot(&[(5, 0.9), (1, 0.6)], 6);
        let r = decode_ctc(&probs.view(), &charset);
        assert_eq!(r.text, "A");
        assert!((r.confidence - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_parse_charset_appends_space() {
        let charset = parse_charset("a\r\nb\n\nc\n").unwrap();
        assert_eq!(charset, vec!["a", "b", "c", " "]);
        assert!(parse_charset("\n\n").is_err());
    }
}
