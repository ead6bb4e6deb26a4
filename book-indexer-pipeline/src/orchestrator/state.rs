//! Run state machine.

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::PipelineError;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Extracting,
    Chunking,
    Embedding,
    Serializing,
    Loading,
    Completed,
    Failed,
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Extracting => 1,
            Self::Chunking => 2,
            Self::Embedding => 3,
            Self::Serializing => 4,
            Self::Loading => 5,
            Self::Completed => 6,
            Self::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Runs only move forward, possibly skipping phases, or fail from any
    /// non-terminal state.
    pub fn can_transition_to(self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }
}

/// Tracks and logs the state of one run.
#[derive(Debug, Clone)]
pub struct RunTracker {
    run_id: Uuid,
    state: RunState,
    history: Vec<RunState>,
}

impl RunTracker {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::NotStarted,
            history: vec![RunState::NotStarted],
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(run_id = %self.run_id, from = ?self.state, to = ?next, "Run state changed");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move forward to `next`, or stay put when the run is already there or
    /// beyond. Books reach the stages one after another, so the state records
    /// the furthest stage any book has reached.
    pub fn advance(&mut self, next: RunState) -> Result<(), PipelineError> {
        if !self.state.is_terminal() && next.rank() <= self.state.rank() {
            return Ok(());
        }
        self.transition(next)
    }

    /// Move to `Failed`; a run that already ended keeps its state.
    pub fn fail(&mut self, cause: &PipelineError) {
        if self.state.is_terminal() {
            return;
        }
        error!(run_id = %self.run_id, from = ?self.state, error = %cause, "Run failed");
        self.state = RunState::Failed;
        self.history.push(RunState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        tracker.transition(RunState::Extracting).unwrap();
        tracker.transition(RunState::Chunking).unwrap();
        tracker.transition(RunState::Serializing).unwrap();
        tracker.transition(RunState::Loading).unwrap();
        tracker.transition(RunState::Completed).unwrap();

        assert_eq!(
            tracker.history(),
            &[
                RunState::NotStarted,
                RunState::Extracting,
                RunState::Chunking,
                RunState::Serializing,
                RunState::Loading,
                RunState::Completed,
            ]
        );
    }

    #[test]
    fn test_backward_transition_is_rejected() {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        tracker.transition(RunState::Chunking).unwrap();

        let err = tracker.transition(RunState::Extracting).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                from: RunState::Chunking,
                to: RunState::Extracting
            }
        ));
        assert!(tracker.transition(RunState::Chunking).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        tracker.transition(RunState::Extracting).unwrap();
        tracker.fail(&PipelineError::Cancelled);

        assert_eq!(tracker.state(), RunState::Failed);
        assert!(tracker.transition(RunState::Completed).is_err());

        tracker.fail(&PipelineError::Cancelled);
        assert_eq!(tracker.history().len(), 3);
    }

    #[test]
    fn test_advance_keeps_furthest_stage() {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        tracker.advance(RunState::Extracting).unwrap();
        tracker.advance(RunState::Chunking).unwrap();
        tracker.advance(RunState::Serializing).unwrap();
        // The next book starts chunking again.
        tracker.advance(RunState::Chunking).unwrap();
        tracker.advance(RunState::Serializing).unwrap();

        assert_eq!(tracker.state(), RunState::Serializing);
        assert_eq!(tracker.history().len(), 4);

        tracker.fail(&PipelineError::Cancelled);
        assert!(tracker.advance(RunState::Chunking).is_err());
    }
}
