use crate::model::SessionGroupId;
use crate::orchestrator::state_machine::PipelineSyncCommand;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    New,
    Processing,
    Processed,
}

#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub sequence: u64,
    pub command: PipelineSyncCommand,
    pub status: CommandStatus,
}

/// Durable FIFO of pipeline commands, scoped per session group.
///
/// The queue is single-flight: while the oldest unprocessed command is
/// `Processing`, `next_active` yields nothing, so commands take effect one
/// at a time in submission order.
pub trait SyncCommandQueue: Send + Sync {
    fn enqueue(&self, group: SessionGroupId, command: PipelineSyncCommand) -> Result<u64>;

    /// Claims the oldest `New` command, transitioning it to `Processing`.
    /// Returns `None` when the queue is empty or a command is already in
    /// flight.
    fn next_active(&self, group: SessionGroupId) -> Result<Option<QueuedCommand>>;

    /// Marks every `Processing` entry for the command as `Processed`.
    /// Idempotent.
    fn mark_processed(&self, group: SessionGroupId, command: PipelineSyncCommand) -> Result<usize>;

    /// Startup recovery: flushes every `New` and `Processing` entry to
    /// `Processed` so stale commands from a dead run cannot fire.
    fn clear_unprocessed(&self, group: SessionGroupId) -> Result<usize>;
}
