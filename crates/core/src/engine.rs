//! OCR contract used by the pipeline, and the lazily built engine handle.

use image::DynamicImage;
use scansort_ocr::PaddleOcrEngine;

use crate::error::{PipelineError, Result};

/// A detected text region; only its confidence matters to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedRegion {
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub confidence: f32,
}

/// Long-lived OCR engine. Calls are strictly sequential.
pub trait OcrBackend: Send {
    /// Regions only, no recognition.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedRegion>>;

    /// Fragments in reading order.
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>>;

    /// Recognition preceded by the engine's own orientation estimate.
    /// Returns the clockwise rotation the engine applied.
    fn recognize_oriented(&mut self, image: &DynamicImage) -> Result<(u32, Vec<TextFragment>)> {
        Ok((0, self.recognize(image)?))
    }
}

impl OcrBackend for PaddleOcrEngine {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedRegion>> {
        let boxes = PaddleOcrEngine::detect(self, image)
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;
        Ok(boxes
            .into_iter()
            .map(|b| DetectedRegion {
                confidence: b.score,
            })
            .collect())
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<TextFragment>> {
        let results = PaddleOcrEngine::recognize(self, image)
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;
        Ok(results
            .into_iter()
            .map(|r| TextFragment {
                text: r.text,
                confidence: r.confidence,
            })
            .collect())
    }

    fn recognize_oriented(&mut self, image: &DynamicImage) -> Result<(u32, Vec<TextFragment>)> {
        let (rotation, results) = PaddleOcrEngine::recognize_oriented(self, image)
            .map_err(|e| PipelineError::Recognition(e.to_string()))?;
        let fragments = results
            .into_iter()
            .map(|r| TextFragment {
                text: r.text,
                confidence: r.confidence,
            })
            .collect();
        Ok((rotation, fragments))
    }
}

pub type EngineFactory = Box<dyn FnMut() -> Result<Box<dyn OcrBackend>> + Send>;

/// Builds the engine on first use and keeps it for the owner's lifetime.
pub struct EngineSlot {
    factory: EngineFactory,
    engine: Option<Box<dyn OcrBackend>>,
    builds: usize,
}

impl EngineSlot {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            engine: None,
            builds: 0,
        }
    }

    /// An already constructed engine.
    pub fn ready(engine: Box<dyn OcrBackend>) -> Self {
        Self {
            factory: Box::new(|| Err(PipelineError::Engine("engine was supplied prebuilt".into()))),
            engine: Some(engine),
            builds: 1,
        }
    }

    pub fn is_built(&self) -> bool {
        self.engine.is_some()
    }

    pub fn build_count(&self) -> usize {
        self.builds
    }

    /// Build on first call; construction failure is reported as `Engine`.
    pub fn get(&mut self) -> Result<&mut dyn OcrBackend> {
        if self.engine.is_none() {
            let engine = (self.factory)().map_err(|e| match e {
                PipelineError::Engine(_) => e,
                other => PipelineError::Engine(other.to_string()),
            })?;
            self.builds += 1;
            self.engine = Some(engine);
            log::info!("[Pipeline] OCR engine initialised");
        }
        match self.engine.as_mut() {
            Some(engine) => {
                let engine: &mut dyn OcrBackend = engine.as_mut();
                Ok(engine)
            }
            None => Err(PipelineError::Engine("engine missing after initialisation".into())),
        }
    }
}
