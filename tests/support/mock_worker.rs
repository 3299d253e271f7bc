use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use syncbridge::{PipelineState, SessionId, SessionWorker, SourceId};

/// Session worker stand-in that records every signal it receives.
///
/// A stubborn worker ignores `stop` and only dies on `force_terminate`,
/// which is how the grace-period path gets exercised.
pub struct MockWorker {
    session_id: SessionId,
    left_source: SourceId,
    right_source: SourceId,
    stubborn: bool,
    alive: AtomicBool,
    state: Mutex<PipelineState>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockWorker {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::new(),
            left_source: SourceId::new(),
            right_source: SourceId::new(),
            stubborn: false,
            alive: AtomicBool::new(true),
            state: Mutex::new(PipelineState::Default),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn stubborn() -> Self {
        Self {
            stubborn: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("mock worker poisoned").clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().expect("mock worker poisoned").push(call);
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().expect("mock worker poisoned") = state;
    }
}

impl Default for MockWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionWorker for MockWorker {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn sources(&self) -> (SourceId, SourceId) {
        (self.left_source, self.right_source)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn current_state(&self) -> PipelineState {
        *self.state.lock().expect("mock worker poisoned")
    }

    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("start");
            self.set_state(PipelineState::Running);
            Ok(())
        })
    }

    fn pause(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("pause");
            self.set_state(PipelineState::Paused);
            Ok(())
        })
    }

    fn resume(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("resume");
            self.set_state(PipelineState::Running);
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("stop");
            if !self.stubborn {
                self.set_state(PipelineState::Stopped);
                self.alive.store(false, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    fn stop_current_trip(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("stop_current_trip");
            self.set_state(PipelineState::StoppedSingleTrip);
            Ok(())
        })
    }

    fn force_terminate(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("force_terminate");
            self.set_state(PipelineState::Stopped);
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}
