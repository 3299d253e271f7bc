mod support;

use std::sync::Arc;
use std::time::Duration;
use support::helpers::init_tracing;
use support::mock_worker::MockWorker;
use syncbridge::orchestrator::CommandStatus;
use syncbridge::batching::MemoryChangeGroupStore;
use syncbridge::model::{ChangeGroup, ChangeGroupStatus};
use syncbridge::{
    ChangeGroupStore, ConflictHub, ConflictKind, ConflictPolicy, ConflictSink, MemoryStateStore,
    MigrationConflict, Orchestrator, OrchestratorParams, OwnerKind, PipelineState,
    PipelineSyncCommand, SessionGroupId, SessionWorker, SyncCommandQueue, SyncConfig,
    SyncStateStore, Telemetry,
};
use tokio_util::sync::CancellationToken;

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Fixture {
    group: SessionGroupId,
    store: Arc<MemoryStateStore>,
    change_groups: Arc<MemoryChangeGroupStore>,
    conflicts: Arc<ConflictHub>,
    telemetry: Arc<Telemetry>,
    orchestrator: Arc<Orchestrator>,
}

fn fast_config(group: SessionGroupId) -> syncbridge::SyncConfigBuilder {
    SyncConfig::builder(group)
        .poll_interval(Duration::from_millis(10))
        .stop_grace_period(Duration::from_millis(50))
}

impl Fixture {
    fn new(workers: Vec<Arc<MockWorker>>) -> Self {
        let config = fast_config(SessionGroupId::new()).build().unwrap();
        Self::with_store(config, workers, Arc::new(MemoryStateStore::default()))
    }

    fn with_store(
        config: SyncConfig,
        workers: Vec<Arc<MockWorker>>,
        store: Arc<MemoryStateStore>,
    ) -> Self {
        init_tracing();
        let group = config.session_group_id();
        let change_groups = Arc::new(MemoryChangeGroupStore::default());
        let (conflicts, conflict_rx) = ConflictHub::new();
        let conflicts = Arc::new(conflicts);
        let telemetry = Arc::new(Telemetry::default());
        let orchestrator = Arc::new(
            Orchestrator::new(OrchestratorParams {
                config,
                workers: workers
                    .into_iter()
                    .map(|w| w as Arc<dyn SessionWorker>)
                    .collect(),
                state_store: store.clone(),
                command_queue: store.clone(),
                change_groups: change_groups.clone(),
                conflict_rx,
                telemetry: telemetry.clone(),
                shutdown_root: CancellationToken::new(),
            })
            .unwrap(),
        );
        Self {
            group,
            store,
            change_groups,
            conflicts,
            telemetry,
            orchestrator,
        }
    }
}

#[tokio::test]
async fn queued_commands_drive_the_group_through_its_lifecycle() {
    let worker = Arc::new(MockWorker::new());
    let fixture = Fixture::new(vec![worker.clone()]);
    let orchestrator = &fixture.orchestrator;

    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.group_state(), PipelineState::Running);
    assert_eq!(worker.current_state(), PipelineState::Running);

    orchestrator.enqueue(PipelineSyncCommand::Pause).unwrap();
    wait_for("group to pause", || {
        orchestrator.group_state() == PipelineState::Paused
    })
    .await;
    assert_eq!(worker.current_state(), PipelineState::Paused);

    orchestrator.enqueue(PipelineSyncCommand::Resume).unwrap();
    wait_for("group to resume", || {
        orchestrator.group_state() == PipelineState::Running
    })
    .await;

    orchestrator.enqueue(PipelineSyncCommand::Stop).unwrap();
    wait_for("group to stop", || {
        orchestrator.group_state() == PipelineState::Stopped
    })
    .await;
    assert!(!worker.is_alive());
    assert_eq!(worker.calls(), vec!["start", "pause", "resume", "stop"]);
    assert!(fixture.telemetry.commands_processed() >= 2);

    orchestrator.join().await;
    assert_eq!(
        fixture
            .store
            .load_state(OwnerKind::SessionGroup, fixture.group.0)
            .unwrap(),
        PipelineState::Stopped
    );

    // the stop that killed the last worker must not stay at the queue head
    // as Processing, or a later run would be blocked by single-flight
    let queued = fixture.store.queued(fixture.group);
    assert_eq!(queued.len(), 3);
    assert!(queued
        .iter()
        .all(|entry| entry.status == CommandStatus::Processed));
}

#[tokio::test]
async fn stubborn_worker_is_force_terminated_after_the_grace_period() {
    let worker = Arc::new(MockWorker::stubborn());
    let fixture = Fixture::new(vec![worker.clone()]);

    // no poll loop; drive the stop directly
    fixture.orchestrator.stop_with_grace().await.unwrap();

    assert!(!worker.is_alive());
    assert_eq!(worker.calls(), vec!["stop", "force_terminate"]);
    assert_eq!(fixture.orchestrator.group_state(), PipelineState::Stopped);
}

#[tokio::test]
async fn conflict_policy_interrupts_only_the_conflicted_session() {
    let conflicted = Arc::new(MockWorker::new());
    let untouched = Arc::new(MockWorker::new());
    let config = fast_config(SessionGroupId::new())
        .conflict_policy(ConflictPolicy::StopConflictedSessionCurrentTrip)
        .build()
        .unwrap();
    let fixture = Fixture::with_store(
        config,
        vec![conflicted.clone(), untouched.clone()],
        Arc::new(MemoryStateStore::default()),
    );
    let orchestrator = &fixture.orchestrator;

    orchestrator.start().await.unwrap();
    fixture.conflicts.raise(MigrationConflict {
        kind: ConflictKind::CyclicLinkReference,
        session_id: conflicted.session_id(),
        source_id: conflicted.sources().0,
        description: "cycle at wi://12".into(),
        link: None,
    });

    wait_for("conflicted session to be interrupted", || {
        conflicted.calls().contains(&"stop_current_trip")
    })
    .await;
    assert!(!untouched.calls().contains(&"stop_current_trip"));
    assert_eq!(fixture.telemetry.conflicts_raised(), 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn recovery_resets_states_flushes_commands_and_requeues_work() {
    let worker = Arc::new(MockWorker::new());
    let group = SessionGroupId::new();
    let store = Arc::new(MemoryStateStore::default());

    // leftovers of a run that died without shutting down
    store
        .save_state(OwnerKind::SessionGroup, group.0, PipelineState::Running)
        .unwrap();
    store
        .save_state(OwnerKind::Session, worker.session_id().0, PipelineState::Running)
        .unwrap();
    store.enqueue(group, PipelineSyncCommand::Pause).unwrap();
    store.enqueue(group, PipelineSyncCommand::Stop).unwrap();
    store.next_active(group).unwrap();

    let config = SyncConfig::builder(group)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let fixture = Fixture::with_store(config, vec![worker.clone()], store.clone());

    let left = worker.sources().0;
    let mut in_progress = ChangeGroup::new("cs-1", "", "alice", 1, left);
    in_progress.set_status(ChangeGroupStatus::InProgress);
    fixture.change_groups.save(in_progress).unwrap();
    let mut analysis = ChangeGroup::new("cs-2", "", "alice", 2, left);
    analysis.set_status(ChangeGroupStatus::Analysis);
    fixture.change_groups.save(analysis).unwrap();

    fixture.orchestrator.recover().unwrap();

    assert_eq!(fixture.orchestrator.group_state(), PipelineState::Default);
    assert_eq!(
        store
            .load_state(OwnerKind::Session, worker.session_id().0)
            .unwrap(),
        PipelineState::Default
    );
    assert!(store.next_active(group).unwrap().is_none());

    let saved = fixture.change_groups.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name(), "cs-1");
    assert_eq!(saved[0].status(), ChangeGroupStatus::Pending);
}

#[tokio::test]
async fn start_is_refused_when_the_group_was_stopped() {
    let worker = Arc::new(MockWorker::new());
    let group = SessionGroupId::new();
    let store = Arc::new(MemoryStateStore::default());
    store
        .save_state(OwnerKind::SessionGroup, group.0, PipelineState::Stopped)
        .unwrap();

    let config = SyncConfig::builder(group)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let fixture = Fixture::with_store(config, vec![worker.clone()], store);

    let err = fixture.orchestrator.start().await.unwrap_err();
    assert!(err.to_string().contains("refused START"));
    assert!(worker.calls().is_empty());
}
