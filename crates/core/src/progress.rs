//! Weighted run progress and the shared status board.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::state::PipelineState;

/// Run phases and their share of the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ingest,
    Orientation,
    Recognition,
    Merge,
}

impl Phase {
    pub fn range(self) -> (f32, f32) {
        match self {
            Phase::Ingest => (0.0, 0.3),
            Phase::Orientation => (0.3, 0.5),
            Phase::Recognition => (0.5, 0.8),
            Phase::Merge => (0.8, 1.0),
        }
    }
}

/// Never moves backwards within a run.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    value: f32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// `done` of `total` items of `phase` are finished. An empty phase
    /// counts as complete.
    pub fn update(&mut self, phase: Phase, done: usize, total: usize) -> f32 {
        let (start, end) = phase.range();
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f32 / total as f32).clamp(0.0, 1.0)
        };
        self.value = self.value.max(start + (end - start) * fraction);
        self.value
    }

    pub fn complete(&mut self) -> f32 {
        self.value = 1.0;
        self.value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: PipelineState,
    pub progress: f32,
    pub message: String,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
            progress: 0.0,
            message: String::new(),
        }
    }
}

/// Coarse run status, written by the worker and polled by the interface.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_state(&self, state: PipelineState) {
        self.update(|s| s.state = state);
    }

    pub fn set_progress(&self, progress: f32) {
        self.update(|s| s.progress = progress);
    }

    /// Status text, mirrored to the log.
    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("[Pipeline] {}", message);
        self.update(|s| s.message = message);
    }

    pub fn reset(&self) {
        self.update(|s| *s = StatusSnapshot::default());
    }

    fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
