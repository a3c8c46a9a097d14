//! Pipeline lifecycle state
//!
//! State only moves forward: `Running -> Draining -> Stopped`. The current
//! value is published on a `watch` channel so every task can observe it at
//! its next poll point.

use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::errors::{PipelineError, PipelineResult};

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    /// Producer, workers and sink are all active
    Running,
    /// No new ids are produced; queued work is being finished
    Draining,
    /// Queues are empty and the final flush has completed
    Stopped,
}

impl PipelineState {
    /// Whether `next` is the single allowed successor of `self`
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Running, PipelineState::Draining)
                | (PipelineState::Draining, PipelineState::Stopped)
        )
    }

    pub fn transition(self, next: PipelineState) -> PipelineResult<PipelineState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PipelineError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owner of the state channel
#[derive(Debug)]
pub struct StateController {
    tx: watch::Sender<PipelineState>,
}

impl Default for StateController {
    fn default() -> Self {
        Self::new()
    }
}

impl StateController {
    /// Start in `Running`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PipelineState::Running);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Move to `next`, rejecting anything but the forward step
    pub fn advance(&self, next: PipelineState) -> PipelineResult<()> {
        let current = self.current();
        let next = current.transition(next)?;
        self.tx.send_replace(next);
        info!("Pipeline state: {} -> {}", current, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        use PipelineState::*;

        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Stopped));

        for (from, to) in [
            (Running, Running),
            (Running, Stopped),
            (Draining, Running),
            (Draining, Draining),
            (Stopped, Running),
            (Stopped, Draining),
            (Stopped, Stopped),
        ] {
            assert!(from.transition(to).is_err(), "{from} -> {to} must fail");
        }
    }

    #[tokio::test]
    async fn test_controller_publishes_changes() {
        let controller = StateController::new();
        let mut rx = controller.subscribe();
        assert_eq!(*rx.borrow(), PipelineState::Running);

        controller.advance(PipelineState::Draining).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), PipelineState::Draining);

        assert!(controller.advance(PipelineState::Running).is_err());
        assert_eq!(controller.current(), PipelineState::Draining);

        controller.advance(PipelineState::Stopped).unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Stopped);
    }
}
