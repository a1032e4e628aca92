//! Run lifecycle.
//!
//! ```text
//! Idle -> Ingesting -> OrientationCorrecting -> Extracting <-> ClassifyingAndGrouping
//!      -> Merging -> Completed
//! any non-terminal -> Cancelling -> Stopped
//! any non-terminal -> Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    Idle,
    Ingesting,
    OrientationCorrecting,
    Extracting,
    ClassifyingAndGrouping,
    Merging,
    Completed,
    Cancelling,
    Stopped,
    /// A fatal error ended the run.
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// A run is in flight.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != Self::Idle
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Ingesting)
            | (Ingesting, OrientationCorrecting)
            | (OrientationCorrecting, Extracting)
            | (Extracting, ClassifyingAndGrouping)
            | (ClassifyingAndGrouping, Extracting)
            | (ClassifyingAndGrouping, Merging)
            | (Extracting, Merging)
            | (Merging, Completed)
            | (Cancelling, Stopped) => true,
            (from, Cancelling) | (from, Failed) => !from.is_terminal() && from != Cancelling,
            (from, Idle) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::OrientationCorrecting => "correcting orientation",
            Self::Extracting => "extracting text",
            Self::ClassifyingAndGrouping => "classifying",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Cancelling => "cancelling",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Guards transitions; staying in the current state is always allowed.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: PipelineState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }
}

impl StateMachine {
    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<PipelineState> {
        if next == self.state {
            return Ok(next);
        }
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        log::debug!("[Pipeline] {} -> {}", self.state, next);
        self.state = next;
        Ok(next)
    }

    /// Back to `Idle` after a finished run.
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.state = PipelineState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::default();
        for next in [
            Ingesting,
            OrientationCorrecting,
            Extracting,
            ClassifyingAndGrouping,
            Extracting,
            ClassifyingAndGrouping,
            Merging,
            Completed,
        ] {
            sm.advance(next).unwrap();
        }
        assert!(sm.state().is_terminal());
        sm.reset();
        assert_eq!(sm.state(), Idle);
    }

    #[test]
    fn test_cancel_reachable_from_every_running_state() {
        for from in [
            Idle,
            Ingesting,
            OrientationCorrecting,
            Extracting,
            ClassifyingAndGrouping,
            Merging,
        ] {
            assert!(from.can_transition_to(Cancelling), "{:?}", from);
        }
        assert!(Cancelling.can_transition_to(Stopped));
        assert!(!Completed.can_transition_to(Cancelling));
        assert!(!Stopped.can_transition_to(Cancelling));
    }

    #[test]
    fn test_illegal_jumps_rejected() {
        let mut sm = StateMachine::default();
        assert!(matches!(
            sm.advance(Merging),
            Err(PipelineError::InvalidTransition { from: Idle, to: Merging })
        ));
        assert_eq!(sm.state(), Idle);
        assert!(!Ingesting.can_transition_to(Idle));
    }
}
