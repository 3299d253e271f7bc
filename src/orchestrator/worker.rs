use crate::model::{SessionId, SourceId};
use crate::orchestrator::state_machine::PipelineState;
use futures::future::BoxFuture;

/// Supervision handle for one running session.
///
/// The orchestrator fans lifecycle signals out through this trait and polls
/// `current_state` / `is_alive` to decide when a command has landed. A
/// worker that honors `stop` within the grace period is never
/// force-terminated.
pub trait SessionWorker: Send + Sync {
    fn session_id(&self) -> SessionId;

    /// Migration source ids for the worker's (left, right) sides.
    fn sources(&self) -> (SourceId, SourceId);

    fn is_alive(&self) -> bool;

    fn current_state(&self) -> PipelineState;

    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn pause(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn resume(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn stop_current_trip(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Last-resort kill after the stop grace period has expired.
    fn force_terminate(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}
