use crate::model::SessionGroupId;
use crate::orchestrator::command_queue::{CommandStatus, QueuedCommand, SyncCommandQueue};
use crate::orchestrator::state_machine::{PipelineState, PipelineSyncCommand};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Which kind of pipeline a persisted state row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    SessionGroup,
    Session,
}

/// Persistence seam for pipeline states.
pub trait SyncStateStore: Send + Sync {
    /// Owners the store has never seen load as `Default`.
    fn load_state(&self, owner: OwnerKind, id: Uuid) -> Result<PipelineState>;

    fn save_state(&self, owner: OwnerKind, id: Uuid, state: PipelineState) -> Result<()>;

    fn reset_state(&self, owner: OwnerKind, id: Uuid) -> Result<()>;
}

#[derive(Default)]
struct StateInner {
    states: HashMap<(OwnerKind, Uuid), PipelineState>,
    queues: HashMap<SessionGroupId, Vec<QueuedCommand>>,
    next_sequence: u64,
}

/// In-memory state store and command queue for tests and single-process
/// runs.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<StateInner>,
}

impl MemoryStateStore {
    /// Every queue entry for one group in sequence order. Test helper.
    pub fn queued(&self, group: SessionGroupId) -> Vec<QueuedCommand> {
        let inner = self.inner.lock().expect("state store poisoned");
        inner.queues.get(&group).cloned().unwrap_or_default()
    }
}

impl SyncStateStore for MemoryStateStore {
    fn load_state(&self, owner: OwnerKind, id: Uuid) -> Result<PipelineState> {
        let inner = self.inner.lock().expect("state store poisoned");
        Ok(inner
            .states
            .get(&(owner, id))
            .copied()
            .unwrap_or(PipelineState::Default))
    }

    fn save_state(&self, owner: OwnerKind, id: Uuid, state: PipelineState) -> Result<()> {
        let mut inner = self.inner.lock().expect("state store poisoned");
        inner.states.insert((owner, id), state);
        Ok(())
    }

    fn reset_state(&self, owner: OwnerKind, id: Uuid) -> Result<()> {
        self.save_state(owner, id, PipelineState::Default)
    }
}

impl SyncCommandQueue for MemoryStateStore {
    fn enqueue(&self, group: SessionGroupId, command: PipelineSyncCommand) -> Result<u64> {
        let mut inner = self.inner.lock().expect("state store poisoned");
        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        inner.queues.entry(group).or_default().push(QueuedCommand {
            sequence,
            command,
            status: CommandStatus::New,
        });
        Ok(sequence)
    }

    fn next_active(&self, group: SessionGroupId) -> Result<Option<QueuedCommand>> {
        let mut inner = self.inner.lock().expect("state store poisoned");
        let Some(queue) = inner.queues.get_mut(&group) else {
            return Ok(None);
        };
        let Some(head) = queue
            .iter_mut()
            .find(|c| c.status != CommandStatus::Processed)
        else {
            return Ok(None);
        };
        // single-flight: a command already being processed blocks the queue
        if head.status == CommandStatus::Processing {
            return Ok(None);
        }
        head.status = CommandStatus::Processing;
        Ok(Some(head.clone()))
    }

    fn mark_processed(&self, group: SessionGroupId, command: PipelineSyncCommand) -> Result<usize> {
        let mut inner = self.inner.lock().expect("state store poisoned");
        let Some(queue) = inner.queues.get_mut(&group) else {
            return Ok(0);
        };
        let mut marked = 0;
        for entry in queue.iter_mut() {
            if entry.status == CommandStatus::Processing && entry.command == command {
                entry.status = CommandStatus::Processed;
                marked += 1;
            }
        }
        Ok(marked)
    }

    fn clear_unprocessed(&self, group: SessionGroupId) -> Result<usize> {
        let mut inner = self.inner.lock().expect("state store poisoned");
        let Some(queue) = inner.queues.get_mut(&group) else {
            return Ok(0);
        };
        let mut cleared = 0;
        for entry in queue.iter_mut() {
            if entry.status != CommandStatus::Processed {
                entry.status = CommandStatus::Processed;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
