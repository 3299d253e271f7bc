pub mod batching;
pub mod linking;
pub mod model;
pub mod orchestrator;
pub mod runtime;

pub use batching::{AddActionParams, BatchedAction, ChangeBatcher, ChangeGroupStore};
pub use linking::{
    LinkAdapter, LinkChangeStore, LinkEngine, LinkEngineConfig, LinkEngineParams,
    ReflectionError, Side,
};
pub use model::{SessionGroupId, SessionId, SourceId};
pub use orchestrator::{
    ConflictPolicy, Orchestrator, OrchestratorParams, PipelineState, PipelineSyncCommand,
    SessionWorker, SyncCommandQueue, SyncStateMachine, TripInterrupt,
};
pub use runtime::config::{SyncConfig, SyncConfigBuilder};
pub use runtime::conflict::{ConflictHub, ConflictKind, ConflictSink, MigrationConflict};
pub use runtime::state_store::{MemoryStateStore, OwnerKind, SyncStateStore};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
