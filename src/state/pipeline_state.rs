//! Pipeline state definitions for tracking a run's lifecycle
//!
//! A run moves forward only: `Idle -> Resuming -> Running -> Draining -> Finished`.
//! `Aborted` is reachable from every non-terminal state.

use crate::CrawlError;
use std::fmt;

/// Represents the current state of an orchestrated run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    // ===== Active States =====
    /// Constructed, nothing loaded yet
    Idle,

    /// Loading the checkpoint and computing the start position
    Resuming,

    /// Dispatching work items to the pool
    Running,

    /// No more submissions; waiting for in-flight items to finish
    Draining,

    // ===== Terminal States =====
    /// All work was consumed (or cancellation drained cleanly)
    Finished,

    /// A fatal error stopped the run
    Aborted,
}

impl PipelineState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }

    /// Returns true if the transition `self -> next` is allowed
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Idle, Resuming) | (Resuming, Running) | (Running, Draining) | (Draining, Finished) => {
                true
            }
            (state, Aborted) => !state.is_terminal(),
            _ => false,
        }
    }

    /// Moves to `next`, or reports the illegal transition
    pub fn transition(&mut self, next: PipelineState) -> crate::Result<()> {
        if !self.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition { from: *self, to: next });
        }

        tracing::debug!("Pipeline state {} -> {}", self, next);
        *self = next;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resuming => "resuming",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
