//! Batch pipeline: scanned files in, one PDF per recognised document out.
//!
//! Inputs are rasterised into page images, orientation-corrected,
//! recognised, classified by identifier and merged into
//! `<export root>/<family folder>/<identifier>.pdf`.

pub mod artifact;
pub mod cancel;
pub mod controller;
pub mod engine;
pub mod error;
pub mod extract;
pub mod group;
pub mod orientation;
pub mod progress;
pub mod source;
pub mod state;
pub mod summary;
pub mod unit;
pub mod worker;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use artifact::{ArtifactWriter, PdfWriter, WriteReport};
pub use cancel::CancellationToken;
pub use controller::{ControllerOptions, PipelineController, RunOutcome, RunRequest, RunStatus};
pub use engine::{DetectedRegion, EngineFactory, EngineSlot, OcrBackend, TextFragment};
pub use error::{PipelineError, Result};
pub use extract::Extraction;
pub use group::{FamilyFolders, MergeStrategy};
pub use orientation::OrientationStrategy;
pub use progress::{StatusBoard, StatusSnapshot};
pub use source::Rasterizer;
pub use state::PipelineState;
pub use summary::{ArtifactRecord, RunSummary, SkipRecord};
pub use unit::{ImageUnit, InputFile, InputKind};
pub use worker::{PipelineWorker, RunTicket};
