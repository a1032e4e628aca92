//! Page orientation correction.
//!
//! The full search rotates the page through the four right angles, scores
//! each with text detection and keeps the best-scoring rotation. The single
//! pass trusts the engine's own orientation estimate. A corrected page is
//! written back over its workspace image.

use image::DynamicImage;
use scansort_ocr::rotate_clockwise;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::engine::{DetectedRegion, OcrBackend, TextFragment};
use crate::unit::ImageUnit;

/// Bonus for candidates that come out taller than wide.
const PORTRAIT_BONUS: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationStrategy {
    #[default]
    Full,
    Single,
}

impl FromStr for OrientationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "single" | "simple" => Ok(Self::Single),
            other => Err(format!("unknown orientation strategy: {}", other)),
        }
    }
}

/// What orientation correction did to one unit.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub rotation: u32,
    /// Fragments already recognised on the corrected page, if the strategy
    /// produced them as a side effect.
    pub prefetched: Option<Vec<TextFragment>>,
}

/// Candidate rotations, most likely first.
pub fn candidate_order(width: u32, height: u32) -> [u32; 4] {
    if width > height {
        [0, 90, 180, 270]
    } else {
        [0, 180, 90, 270]
    }
}

/// regions x mean confidence, with the portrait bonus.
pub fn score_regions(regions: &[DetectedRegion], width: u32, height: u32) -> f32 {
    if regions.is_empty() {
        return 0.0;
    }
    let mean = regions.iter().map(|r| r.confidence).sum::<f32>() / regions.len() as f32;
    let score = regions.len() as f32 * mean;
    if height > width {
        score * PORTRAIT_BONUS
    } else {
        score
    }
}

/// Best rotation for `image`; 0 when nothing scores above zero. A failed
/// attempt scores zero.
pub fn full_search(image: &DynamicImage, engine: &mut dyn OcrBackend) -> u32 {
    let mut best_rotation = 0;
    let mut best_score = 0.0f32;

    for rotation in candidate_order(image.width(), image.height()) {
        let candidate = DynamicImage::ImageRgb8(rotate_clockwise(image, rotation).to_rgb8());
        let score = match engine.detect(&candidate) {
            Ok(regions) => score_regions(&regions, candidate.width(), candidate.height()),
            Err(e) => {
                log::debug!("[Orientation] detection at {}° failed: {}", rotation, e);
                0.0
            }
        };
        log::debug!("[Orientation] {}° -> {:.3}", rotation, score);
        if score > best_score {
            best_score = score;
            best_rotation = rotation;
        }
    }
    best_rotation
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationResolver {
    strategy: OrientationStrategy,
}

impl OrientationResolver {
    pub fn new(strategy: OrientationStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> OrientationStrategy {
        self.strategy
    }

    /// Correct `unit` in place. Never fails: any internal error leaves the
    /// page as it was.
    pub fn resolve(&self, unit: &mut ImageUnit, engine: &mut dyn OcrBackend) -> Resolution {
        let image = match image::open(&unit.path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("[Orientation] {}: cannot read page: {}", unit.label(), e);
                return Resolution::default();
            }
        };

        let (rotation, prefetched) = match self.strategy {
            OrientationStrategy::Full => (full_search(&image, engine), None),
            OrientationStrategy::Single => match engine.recognize_oriented(&image) {
                Ok((rotation, fragments)) => (rotation % 360, Some(fragments)),
                Err(e) => {
                    log::warn!("[Orientation] {}: oriented recognition failed: {}", unit.label(), e);
                    return Resolution::default();
                }
            },
        };

        if rotation == 0 {
            return Resolution {
                rotation: 0,
                prefetched,
            };
        }

        if let Err(e) = rotate_clockwise(&image, rotation).save(&unit.path) {
            log::warn!("[Orientation] {}: cannot write corrected page: {}", unit.label(), e);
            // Fragments were read off the rotated page, which no longer matches.
            return Resolution::default();
        }

        log::info!("[Orientation] {}: rotated {}°", unit.label(), rotation);
        unit.rotation = rotation;
        unit.orientation_corrected = true;
        Resolution {
            rotation,
            prefetched,
        }
    }
}
