use std::path::PathBuf;

use crate::state::PipelineState;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Nothing was started: missing inputs, missing destination, or a run
    /// already in progress.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// One input file could not be turned into pages; the file is skipped.
    #[error("cannot render {path}: {reason}")]
    Render { path: PathBuf, reason: String },

    #[error("recognition failed: {0}")]
    Recognition(String),

    /// Writing or growing an output artifact failed; the group is skipped.
    #[error("merge failed: {0}")]
    Merge(String),

    #[error("stopped by request")]
    StoppedByRequest,

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("ocr engine unavailable: {0}")]
    Engine(String),

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("worker unavailable: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn render(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that end the whole run rather than one file, unit or group.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_)
                | Self::Workspace(_)
                | Self::Engine(_)
                | Self::InvalidTransition { .. }
                | Self::Worker(_)
        )
    }
}
