//! The polling orchestrator supervising a session group's workers.

use crate::batching::store::ChangeGroupStore;
use crate::orchestrator::command_queue::{QueuedCommand, SyncCommandQueue};
use crate::orchestrator::state_machine::{
    PipelineState, PipelineSyncCommand, SyncStateMachine,
};
use crate::orchestrator::worker::SessionWorker;
use crate::runtime::config::SyncConfig;
use crate::runtime::conflict::MigrationConflict;
use crate::runtime::state_store::{OwnerKind, SyncStateStore};
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct OrchestratorParams {
    pub config: SyncConfig,
    pub workers: Vec<Arc<dyn SessionWorker>>,
    pub state_store: Arc<dyn SyncStateStore>,
    pub command_queue: Arc<dyn SyncCommandQueue>,
    pub change_groups: Arc<dyn ChangeGroupStore>,
    pub conflict_rx: UnboundedReceiver<MigrationConflict>,
    pub telemetry: Arc<Telemetry>,
    pub shutdown_root: CancellationToken,
}

/// Supervises one session group: drives the persisted command queue on a
/// polling loop, fans lifecycle commands out to workers, and applies the
/// conflict policy to unresolved conflicts.
pub struct Orchestrator {
    config: SyncConfig,
    group_machine: Arc<SyncStateMachine>,
    workers: Vec<Arc<dyn SessionWorker>>,
    state_store: Arc<dyn SyncStateStore>,
    command_queue: Arc<dyn SyncCommandQueue>,
    change_groups: Arc<dyn ChangeGroupStore>,
    conflict_rx: Mutex<Option<UnboundedReceiver<MigrationConflict>>>,
    telemetry: Arc<Telemetry>,
    run_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(params: OrchestratorParams) -> Result<Self> {
        let OrchestratorParams {
            config,
            workers,
            state_store,
            command_queue,
            change_groups,
            conflict_rx,
            telemetry,
            shutdown_root,
        } = params;
        if workers.is_empty() {
            bail!("a session group needs at least one session worker");
        }
        let group_machine = Arc::new(SyncStateMachine::new(
            OwnerKind::SessionGroup,
            config.session_group_id().0,
            state_store.clone(),
        )?);
        Ok(Self {
            config,
            group_machine,
            workers,
            state_store,
            command_queue,
            change_groups,
            conflict_rx: Mutex::new(Some(conflict_rx)),
            telemetry,
            run_token: shutdown_root.child_token(),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn group_state(&self) -> PipelineState {
        self.group_machine.current_state()
    }

    pub fn group_machine(&self) -> &Arc<SyncStateMachine> {
        &self.group_machine
    }

    pub fn enqueue(&self, command: PipelineSyncCommand) -> Result<u64> {
        self.command_queue
            .enqueue(self.config.session_group_id(), command)
    }

    /// Startup recovery after an unclean shutdown: every pipeline returns
    /// to `Default`, stale queued commands are flushed, and change groups a
    /// dead run left mid-flight go back to the work queue.
    pub fn recover(&self) -> Result<()> {
        self.group_machine.reset()?;
        for worker in &self.workers {
            self.state_store
                .reset_state(OwnerKind::Session, worker.session_id().0)?;
        }
        let flushed = self
            .command_queue
            .clear_unprocessed(self.config.session_group_id())?;

        let mut sources = HashSet::new();
        for worker in &self.workers {
            let (left, right) = worker.sources();
            sources.insert(left);
            sources.insert(right);
        }
        let mut demoted = 0;
        let mut removed = 0;
        for source in sources {
            demoted += self.change_groups.demote_in_progress_to_pending(source)?;
            removed += self.change_groups.remove_incomplete_groups(source)?;
        }
        tracing::info!(
            group = %self.config.session_group_id(),
            commands_flushed = flushed,
            groups_demoted = demoted,
            groups_removed = removed,
            "startup recovery complete"
        );
        Ok(())
    }

    /// Starts the workers and the polling loop. Fails when the group cannot
    /// accept START in its current state.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if !self.group_machine.try_transit(PipelineSyncCommand::Start)? {
            bail!(
                "session group {} refused START in state {}",
                self.config.session_group_id(),
                self.group_machine.current_state()
            );
        }
        for worker in &self.workers {
            worker.start().await?;
        }
        self.group_machine
            .command_transit_finished(PipelineSyncCommand::Start)?;

        let conflict_rx = self
            .conflict_rx
            .lock()
            .expect("orchestrator poisoned")
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator already started"))?;

        let mut handles = self.handles.lock().expect("orchestrator poisoned");
        handles.push(tokio::spawn(self.clone().poll_loop(conflict_rx)));
        handles.push(telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.run_token.clone(),
            self.config.metrics_interval(),
        ));
        if let Some(timeout) = self.config.run_timeout() {
            let orchestrator = self.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = orchestrator.run_token.cancelled() => {}
                    _ = time::sleep(timeout) => {
                        tracing::warn!(
                            group = %orchestrator.config.session_group_id(),
                            "run timeout elapsed, stopping session group"
                        );
                        if let Err(err) = orchestrator.stop_with_grace().await {
                            tracing::error!(error = %err, "timeout stop failed");
                        }
                    }
                }
            }));
        }
        Ok(())
    }

    /// Cancels the polling loop and waits for the background tasks.
    pub async fn shutdown(&self) {
        self.run_token.cancel();
        let handles: Vec<_> = self
            .handles
            .lock()
            .expect("orchestrator poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "orchestrator task panicked");
            }
        }
    }

    /// Waits until the polling loop exits on its own (all workers done).
    pub async fn join(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .expect("orchestrator poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "orchestrator task panicked");
            }
        }
    }

    async fn poll_loop(self: Arc<Self>, mut conflict_rx: UnboundedReceiver<MigrationConflict>) {
        let group = self.config.session_group_id();
        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Option<QueuedCommand> = None;

        loop {
            tokio::select! {
                _ = self.run_token.cancelled() => {
                    tracing::debug!(group = %group, "orchestrator poll loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    while let Ok(conflict) = conflict_rx.try_recv() {
                        self.apply_conflict_policy(conflict).await;
                    }

                    if !self.any_worker_alive() {
                        // a command dispatched on an earlier tick must not be
                        // left at the queue head as Processing
                        if let Some(command) = in_flight.take() {
                            if let Err(err) = self.finish_command(command.command) {
                                tracing::error!(error = %err, "failed to finish command");
                            }
                        }
                        let _ = self.group_machine.try_transit(PipelineSyncCommand::Finish);
                        if let Err(err) = self
                            .group_machine
                            .command_transit_finished(PipelineSyncCommand::Finish)
                        {
                            tracing::error!(error = %err, "failed to land FINISH");
                        }
                        tracing::info!(group = %group, "all session workers done, finishing");
                        self.run_token.cancel();
                        break;
                    }

                    // wait for in-flight transitions before touching the queue
                    if self
                        .workers
                        .iter()
                        .any(|w| w.is_alive() && w.current_state().is_intermittent())
                    {
                        continue;
                    }

                    if let Some(command) = in_flight.take() {
                        if let Err(err) = self.finish_command(command.command) {
                            tracing::error!(error = %err, "failed to finish command");
                        }
                    }

                    match self.command_queue.next_active(group) {
                        Ok(Some(command)) => {
                            if let Err(err) = self.dispatch(command, &mut in_flight).await {
                                tracing::error!(error = %err, "command dispatch failed");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => tracing::error!(error = %err, "command queue read failed"),
                    }
                }
            }
        }
    }

    fn any_worker_alive(&self) -> bool {
        self.workers.iter().any(|w| w.is_alive())
    }

    fn finish_command(&self, command: PipelineSyncCommand) -> Result<()> {
        self.command_queue
            .mark_processed(self.config.session_group_id(), command)?;
        self.group_machine.command_transit_finished(command)?;
        self.telemetry.record_command_processed();
        Ok(())
    }

    async fn dispatch(
        &self,
        command: QueuedCommand,
        in_flight: &mut Option<QueuedCommand>,
    ) -> Result<()> {
        tracing::info!(
            group = %self.config.session_group_id(),
            command = %command.command,
            sequence = command.sequence,
            "dispatching sync command"
        );
        match command.command {
            PipelineSyncCommand::Stop | PipelineSyncCommand::Finish => {
                self.stop().await?;
                *in_flight = Some(command);
            }
            PipelineSyncCommand::Pause | PipelineSyncCommand::PauseForConflict => {
                self.signal_pause(command.command).await?;
                *in_flight = Some(command);
            }
            PipelineSyncCommand::Resume => {
                self.resume().await?;
                *in_flight = Some(command);
            }
            PipelineSyncCommand::Start
            | PipelineSyncCommand::StartNewTrip
            | PipelineSyncCommand::StopCurrentTrip
            | PipelineSyncCommand::Default => {
                self.finish_command(command.command)?;
            }
        }
        Ok(())
    }

    /// Signals every live worker to stop. A no-op returning `false` when
    /// the group cannot accept STOP.
    pub async fn stop(&self) -> Result<bool> {
        if !self.group_machine.try_transit(PipelineSyncCommand::Stop)? {
            return Ok(false);
        }
        for worker in self.workers.iter().filter(|w| w.is_alive()) {
            if let Err(err) = worker.stop().await {
                tracing::error!(session = %worker.session_id(), error = %err, "worker stop failed");
            }
        }
        Ok(true)
    }

    pub async fn pause(&self) -> Result<bool> {
        self.signal_pause(PipelineSyncCommand::Pause).await
    }

    async fn signal_pause(&self, command: PipelineSyncCommand) -> Result<bool> {
        if !self.group_machine.try_transit(command)? {
            return Ok(false);
        }
        for worker in self.workers.iter().filter(|w| w.is_alive()) {
            if let Err(err) = worker.pause().await {
                tracing::error!(session = %worker.session_id(), error = %err, "worker pause failed");
            }
        }
        Ok(true)
    }

    pub async fn resume(&self) -> Result<bool> {
        if !self.group_machine.try_transit(PipelineSyncCommand::Resume)? {
            return Ok(false);
        }
        for worker in self.workers.iter().filter(|w| w.is_alive()) {
            if let Err(err) = worker.resume().await {
                tracing::error!(session = %worker.session_id(), error = %err, "worker resume failed");
            }
        }
        Ok(true)
    }

    /// Stops the group, waits out the grace period, and force-terminates
    /// whichever workers are still alive.
    pub async fn stop_with_grace(&self) -> Result<()> {
        let _ = self.stop().await?;

        let deadline = Instant::now() + self.config.stop_grace_period();
        let probe = self.config.poll_interval();
        while Instant::now() < deadline && self.any_worker_alive() {
            time::sleep(probe).await;
        }

        for worker in self.workers.iter().filter(|w| w.is_alive()) {
            tracing::warn!(
                session = %worker.session_id(),
                "worker did not stop within the grace period, terminating"
            );
            if let Err(err) = worker.force_terminate().await {
                tracing::error!(session = %worker.session_id(), error = %err, "force terminate failed");
            }
        }
        self.group_machine
            .command_transit_finished(PipelineSyncCommand::Stop)?;
        Ok(())
    }

    async fn apply_conflict_policy(&self, conflict: MigrationConflict) {
        self.telemetry.record_conflict();
        let policy = self.config.conflict_policy();
        tracing::warn!(
            session = %conflict.session_id,
            kind = %conflict.kind,
            policy = ?policy,
            "applying conflict policy to unresolved conflict"
        );
        use crate::orchestrator::policy::ConflictPolicy;
        match policy {
            ConflictPolicy::Continue => {}
            ConflictPolicy::StopAllSessionsCurrentTrip => {
                for worker in self.workers.iter().filter(|w| w.is_alive()) {
                    if let Err(err) = worker.stop_current_trip().await {
                        tracing::error!(session = %worker.session_id(), error = %err, "stop current trip failed");
                    }
                }
            }
            ConflictPolicy::StopConflictedSessionCurrentTrip => {
                if let Some(worker) = self.conflicted_worker(&conflict) {
                    if let Err(err) = worker.stop_current_trip().await {
                        tracing::error!(session = %worker.session_id(), error = %err, "stop current trip failed");
                    }
                }
            }
            ConflictPolicy::StopConflictedSession => {
                if let Some(worker) = self.conflicted_worker(&conflict) {
                    if let Err(err) = worker.stop().await {
                        tracing::error!(session = %worker.session_id(), error = %err, "worker stop failed");
                    }
                }
            }
        }
    }

    fn conflicted_worker(&self, conflict: &MigrationConflict) -> Option<&Arc<dyn SessionWorker>> {
        self.workers
            .iter()
            .find(|w| w.is_alive() && w.session_id() == conflict.session_id)
    }
}
