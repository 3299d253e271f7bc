//! Pipeline state machine, command queue, and the polling orchestrator
//! that supervises session workers.

pub mod command_queue;
pub mod lifecycle;
pub mod policy;
pub mod state_machine;
pub mod worker;

pub use command_queue::{CommandStatus, QueuedCommand, SyncCommandQueue};
pub use lifecycle::{Orchestrator, OrchestratorParams};
pub use policy::{ConflictPolicy, OrchestrationPolicy, TripInterrupt};
pub use state_machine::{PipelineState, PipelineSyncCommand, SyncStateMachine};
pub use worker::SessionWorker;
