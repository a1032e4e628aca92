//! Text extraction for one corrected unit.

use crate::engine::{OcrBackend, TextFragment};
use crate::unit::ImageUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Text { text: String, confidence: f32 },
    /// Recognition ran but found nothing.
    Empty,
    /// Recognition could not run; the reason is kept for the summary.
    Failed(String),
}

impl Extraction {
    /// Fragments joined in the order given, single-space separated.
    pub fn from_fragments(fragments: &[TextFragment]) -> Self {
        let parts: Vec<&str> = fragments
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if parts.is_empty() {
            return Self::Empty;
        }
        let confidence =
            fragments.iter().map(|f| f.confidence).sum::<f32>() / fragments.len() as f32;
        Self::Text {
            text: parts.join(" "),
            confidence,
        }
    }

    /// Empty unless `Text`.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            _ => "",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Full recognition of the unit's persisted page. Never errors.
pub fn extract(unit: &ImageUnit, engine: &mut dyn OcrBackend) -> Extraction {
    let image = match image::open(&unit.path) {
        Ok(img) => img,
        Err(e) => {
            log::warn!("[Extract] {}: cannot read page: {}", unit.label(), e);
            return Extraction::Failed(e.to_string());
        }
    };

    match engine.recognize(&image) {
        Ok(fragments) => {
            let extraction = Extraction::from_fragments(&fragments);
            if extraction == Extraction::Empty {
                log::info!("[Extract] {}: no text", unit.label());
            }
            extraction
        }
        Err(e) => {
            log::warn!("[Extract] {}: {}", unit.label(), e);
            Extraction::Failed(e.to_string())
        }
    }
}
