use crate::orchestrator::state_machine::{
    PipelineState, PipelineSyncCommand, SyncStateMachine,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// What the orchestrator does with a session whose conflict went
/// unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Leave the sessions running; the conflict stays queued for manual
    /// resolution.
    #[default]
    Continue,
    /// End the current trip of the conflicted session only.
    StopConflictedSessionCurrentTrip,
    /// Stop the conflicted session entirely.
    StopConflictedSession,
    /// End the current trip of every session in the group.
    StopAllSessionsCurrentTrip,
}

/// Control-flow signal a checkpoint hands back to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripInterrupt {
    /// The session was stopped; leave the run loop.
    Stop,
    /// The current trip was cut short; a new trip may start.
    StopSingleTrip,
    /// Blocking conflicts paused the session; wait for resolution.
    ConflictPause,
}

const RESUME_POLL: Duration = Duration::from_secs(1);

/// Checkpoint logic session workers run between pipeline stages.
///
/// A checkpoint lands whatever intermittent state the machine sits in,
/// parks while the session is paused, and reports stop or conflict-pause
/// outcomes as [`TripInterrupt`]s for the caller to unwind on.
pub struct OrchestrationPolicy {
    state_machine: Arc<SyncStateMachine>,
    resume_poll: Duration,
}

impl OrchestrationPolicy {
    pub fn new(state_machine: Arc<SyncStateMachine>) -> Self {
        Self {
            state_machine,
            resume_poll: RESUME_POLL,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_resume_poll(mut self, resume_poll: Duration) -> Self {
        self.resume_poll = resume_poll;
        self
    }

    pub fn state_machine(&self) -> &Arc<SyncStateMachine> {
        &self.state_machine
    }

    pub async fn check(&self) -> Result<Option<TripInterrupt>> {
        match self.state_machine.current_state() {
            PipelineState::Pausing => self
                .state_machine
                .command_transit_finished(PipelineSyncCommand::Pause)?,
            PipelineState::PausingForConflict => self
                .state_machine
                .command_transit_finished(PipelineSyncCommand::PauseForConflict)?,
            PipelineState::Starting => self
                .state_machine
                .command_transit_finished(PipelineSyncCommand::Start)?,
            PipelineState::Stopping => self
                .state_machine
                .command_transit_finished(PipelineSyncCommand::Stop)?,
            PipelineState::StoppingSingleTrip => self
                .state_machine
                .command_transit_finished(PipelineSyncCommand::StopCurrentTrip)?,
            _ => {}
        }

        while self.state_machine.current_state() == PipelineState::Paused {
            tokio::time::sleep(self.resume_poll).await;
        }

        Ok(match self.state_machine.current_state() {
            PipelineState::Stopped => Some(TripInterrupt::Stop),
            PipelineState::StoppedSingleTrip => Some(TripInterrupt::StopSingleTrip),
            PipelineState::PausedByConflict => Some(TripInterrupt::ConflictPause),
            _ => None,
        })
    }
}
