use crate::runtime::state_store::{OwnerKind, SyncStateStore};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Where a pipeline sits in its lifecycle.
///
/// Intermittent states are held while a command's side effects are still in
/// flight; stable states are where the pipeline rests between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Default,
    Starting,
    Running,
    Pausing,
    Paused,
    PausingForConflict,
    PausedByConflict,
    Stopping,
    Stopped,
    StoppingSingleTrip,
    StoppedSingleTrip,
}

impl PipelineState {
    pub fn is_intermittent(self) -> bool {
        matches!(
            self,
            PipelineState::Starting
                | PipelineState::Pausing
                | PipelineState::PausingForConflict
                | PipelineState::Stopping
                | PipelineState::StoppingSingleTrip
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Default => "Default",
            PipelineState::Starting => "Starting",
            PipelineState::Running => "Running",
            PipelineState::Pausing => "Pausing",
            PipelineState::Paused => "Paused",
            PipelineState::PausingForConflict => "PausingForConflict",
            PipelineState::PausedByConflict => "PausedByConflict",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
            PipelineState::StoppingSingleTrip => "StoppingSingleTrip",
            PipelineState::StoppedSingleTrip => "StoppedSingleTrip",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineSyncCommand {
    Default,
    Start,
    StartNewTrip,
    Pause,
    PauseForConflict,
    Resume,
    Stop,
    StopCurrentTrip,
    Finish,
}

impl std::fmt::Display for PipelineSyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Valid transitions out of every state. `None` means the command is
/// rejected and the state is left untouched.
pub fn transition(
    state: PipelineState,
    command: PipelineSyncCommand,
) -> Option<PipelineState> {
    use PipelineState as S;
    use PipelineSyncCommand as C;
    match (state, command) {
        (S::Default, C::Start | C::StartNewTrip) => Some(S::Starting),
        (S::Default, C::Pause) => Some(S::Pausing),
        (S::Default, C::PauseForConflict) => Some(S::PausingForConflict),
        (S::Default, C::Stop | C::Finish) => Some(S::Stopping),
        (S::Default, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::Running, C::Start | C::StartNewTrip | C::Resume) => Some(S::Running),
        (S::Running, C::Pause) => Some(S::Pausing),
        (S::Running, C::PauseForConflict) => Some(S::PausingForConflict),
        (S::Running, C::Stop | C::Finish) => Some(S::Stopping),
        (S::Running, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::Paused, C::Pause) => Some(S::Paused),
        (S::Paused, C::Resume) => Some(S::Starting),
        (S::Paused, C::Stop | C::Finish) => Some(S::Stopping),
        (S::Paused, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::Starting, C::Start | C::StartNewTrip) => Some(S::Starting),
        (S::Starting, C::Pause) => Some(S::Pausing),
        (S::Starting, C::PauseForConflict) => Some(S::PausingForConflict),
        (S::Starting, C::Stop | C::Finish) => Some(S::Stopping),
        (S::Starting, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::Pausing, C::Pause) => Some(S::Pausing),
        (S::Pausing, C::Stop | C::Finish) => Some(S::Stopping),
        (S::Pausing, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::PausingForConflict, C::PauseForConflict) => Some(S::PausingForConflict),
        (S::PausingForConflict, C::Pause) => Some(S::Pausing),
        (S::PausingForConflict, C::Stop | C::Finish) => Some(S::Stopping),
        (S::PausingForConflict, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::PausedByConflict, C::Resume | C::StartNewTrip) => Some(S::Starting),
        (S::PausedByConflict, C::Pause) => Some(S::Pausing),
        (S::PausedByConflict, C::Stop | C::Finish) => Some(S::Stopping),
        (S::PausedByConflict, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::StoppedSingleTrip, C::StartNewTrip) => Some(S::Starting),
        (S::StoppedSingleTrip, C::Pause) => Some(S::Pausing),
        (S::StoppedSingleTrip, C::Stop | C::Finish) => Some(S::Stopping),
        (S::StoppedSingleTrip, C::StopCurrentTrip) => Some(S::StoppedSingleTrip),

        (S::StoppingSingleTrip, C::Pause) => Some(S::Pausing),
        (S::StoppingSingleTrip, C::Stop | C::Finish) => Some(S::Stopping),
        (S::StoppingSingleTrip, C::StopCurrentTrip) => Some(S::StoppingSingleTrip),

        (S::Stopping, C::Stop | C::Finish | C::StopCurrentTrip) => Some(S::Stopping),

        (S::Stopped, C::Stop | C::Finish) => Some(S::Stopped),

        _ => None,
    }
}

/// Persisted pipeline state machine for one owner (a session group or a
/// single session).
pub struct SyncStateMachine {
    owner: OwnerKind,
    owner_id: Uuid,
    store: Arc<dyn SyncStateStore>,
    state: Mutex<PipelineState>,
}

impl SyncStateMachine {
    /// Loads the owner's persisted state, defaulting to `Default` when the
    /// store has never seen this owner.
    pub fn new(owner: OwnerKind, owner_id: Uuid, store: Arc<dyn SyncStateStore>) -> Result<Self> {
        let state = store.load_state(owner, owner_id)?;
        Ok(Self {
            owner,
            owner_id,
            store,
            state: Mutex::new(state),
        })
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn current_state(&self) -> PipelineState {
        *self.state.lock().expect("state machine poisoned")
    }

    /// Attempts a command. On success the new state is persisted and `true`
    /// returned; the caller must call [`command_transit_finished`] once the
    /// command's side effects have landed.
    ///
    /// [`command_transit_finished`]: Self::command_transit_finished
    pub fn try_transit(&self, command: PipelineSyncCommand) -> Result<bool> {
        let mut state = self.state.lock().expect("state machine poisoned");
        match transition(*state, command) {
            Some(next) => {
                tracing::debug!(
                    owner = %self.owner_id,
                    from = %state,
                    to = %next,
                    command = ?command,
                    "pipeline transition"
                );
                *state = next;
                self.store.save_state(self.owner, self.owner_id, next)?;
                Ok(true)
            }
            None => {
                tracing::debug!(
                    owner = %self.owner_id,
                    state = %state,
                    command = ?command,
                    "pipeline transition rejected"
                );
                Ok(false)
            }
        }
    }

    /// Lands the intermittent state a finished command left the pipeline in.
    /// A no-op when the pipeline is not in that command's intermittent
    /// state.
    pub fn command_transit_finished(&self, command: PipelineSyncCommand) -> Result<()> {
        use PipelineState as S;
        use PipelineSyncCommand as C;
        let mut state = self.state.lock().expect("state machine poisoned");
        let landed = match (command, *state) {
            (C::Finish | C::Stop, S::Stopping) => Some(S::Stopped),
            (C::Pause, S::Pausing) => Some(S::Paused),
            (C::PauseForConflict, S::PausingForConflict) => Some(S::PausedByConflict),
            (C::Resume | C::Start | C::StartNewTrip, S::Starting) => Some(S::Running),
            (C::StopCurrentTrip, S::StoppingSingleTrip) => Some(S::StoppedSingleTrip),
            _ => None,
        };
        if let Some(next) = landed {
            *state = next;
            self.store.save_state(self.owner, self.owner_id, next)?;
        }
        Ok(())
    }

    /// Forces the owner back to `Default`, used during startup recovery.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().expect("state machine poisoned");
        self.store.reset_state(self.owner, self.owner_id)?;
        *state = PipelineState::Default;
        Ok(())
    }

    /// Re-reads the persisted state, discarding the in-memory copy.
    pub fn reload(&self) -> Result<()> {
        let loaded = self.store.load_state(self.owner, self.owner_id)?;
        *self.state.lock().expect("state machine poisoned") = loaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::state_store::MemoryStateStore;

    fn machine() -> SyncStateMachine {
        SyncStateMachine::new(
            OwnerKind::SessionGroup,
            Uuid::new_v4(),
            Arc::new(MemoryStateStore::default()),
        )
        .unwrap()
    }

    #[test]
    fn start_reaches_running_via_starting() {
        let sm = machine();
        assert!(sm.try_transit(PipelineSyncCommand::Start).unwrap());
        assert_eq!(sm.current_state(), PipelineState::Starting);
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();
        assert_eq!(sm.current_state(), PipelineState::Running);
    }

    #[test]
    fn stop_reaches_stopped_via_stopping() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();
        assert!(sm.try_transit(PipelineSyncCommand::Stop).unwrap());
        assert_eq!(sm.current_state(), PipelineState::Stopping);
        sm.command_transit_finished(PipelineSyncCommand::Stop).unwrap();
        assert_eq!(sm.current_state(), PipelineState::Stopped);
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Stop).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Stop).unwrap();
        assert!(!sm.try_transit(PipelineSyncCommand::Resume).unwrap());
        assert_eq!(sm.current_state(), PipelineState::Stopped);
    }

    #[test]
    fn resume_from_paused_restarts() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();
        sm.try_transit(PipelineSyncCommand::Pause).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Pause).unwrap();
        assert_eq!(sm.current_state(), PipelineState::Paused);
        assert!(sm.try_transit(PipelineSyncCommand::Resume).unwrap());
        assert_eq!(sm.current_state(), PipelineState::Starting);
    }

    #[test]
    fn single_trip_stop_allows_a_new_trip() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();
        sm.try_transit(PipelineSyncCommand::StopCurrentTrip).unwrap();
        assert_eq!(sm.current_state(), PipelineState::StoppingSingleTrip);
        sm.command_transit_finished(PipelineSyncCommand::StopCurrentTrip)
            .unwrap();
        assert_eq!(sm.current_state(), PipelineState::StoppedSingleTrip);
        assert!(sm.try_transit(PipelineSyncCommand::StartNewTrip).unwrap());
        assert_eq!(sm.current_state(), PipelineState::Starting);
    }

    #[test]
    fn conflict_pause_lands_and_resumes_as_a_new_trip() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();
        assert!(sm.try_transit(PipelineSyncCommand::PauseForConflict).unwrap());
        sm.command_transit_finished(PipelineSyncCommand::PauseForConflict)
            .unwrap();
        assert_eq!(sm.current_state(), PipelineState::PausedByConflict);
        assert!(sm.try_transit(PipelineSyncCommand::StartNewTrip).unwrap());
    }

    #[test]
    fn mismatched_finish_is_a_noop() {
        let sm = machine();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        // Pause finishing while Starting must not land Paused
        sm.command_transit_finished(PipelineSyncCommand::Pause).unwrap();
        assert_eq!(sm.current_state(), PipelineState::Starting);
    }

    #[test]
    fn state_survives_a_reload() {
        let store = Arc::new(MemoryStateStore::default());
        let id = Uuid::new_v4();
        let sm = SyncStateMachine::new(OwnerKind::SessionGroup, id, store.clone()).unwrap();
        sm.try_transit(PipelineSyncCommand::Start).unwrap();
        sm.command_transit_finished(PipelineSyncCommand::Start).unwrap();

        let reloaded = SyncStateMachine::new(OwnerKind::SessionGroup, id, store).unwrap();
        assert_eq!(reloaded.current_state(), PipelineState::Running);
    }
}
