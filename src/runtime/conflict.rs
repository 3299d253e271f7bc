use crate::model::{Link, SessionId, SourceId};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Category of a detected migration conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A link change would introduce a cycle into a non-circular topology.
    CyclicLinkReference,
    /// An Add would give a second parent to an artifact in a single-parent
    /// topology.
    SingleParentViolation,
    /// A change group could not be translated after exhausting retries.
    LinkTranslation,
    /// An endpoint adapter failed while analyzing or applying a change
    /// group; the group is held instead of aborting the pass.
    AdapterFailure,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::CyclicLinkReference => write!(f, "cyclic link reference"),
            ConflictKind::SingleParentViolation => write!(f, "single parent violation"),
            ConflictKind::LinkTranslation => write!(f, "link translation failure"),
            ConflictKind::AdapterFailure => write!(f, "adapter failure"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConflict {
    pub kind: ConflictKind,
    pub session_id: SessionId,
    pub source_id: SourceId,
    pub description: String,
    pub link: Option<Link>,
}

/// Where detected conflicts are reported.
pub trait ConflictSink: Send + Sync {
    fn raise(&self, conflict: MigrationConflict);
}

/// Records every raised conflict and forwards unresolved ones to whoever
/// holds the receiver side, typically the orchestrator poll loop.
pub struct ConflictHub {
    raised: Mutex<Vec<MigrationConflict>>,
    unresolved_tx: mpsc::UnboundedSender<MigrationConflict>,
}

impl ConflictHub {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MigrationConflict>) {
        let (unresolved_tx, unresolved_rx) = mpsc::unbounded_channel();
        let hub = Self {
            raised: Mutex::new(Vec::new()),
            unresolved_tx,
        };
        (hub, unresolved_rx)
    }

    pub fn raised(&self) -> Vec<MigrationConflict> {
        self.raised.lock().expect("conflict hub poisoned").clone()
    }
}

impl ConflictSink for ConflictHub {
    fn raise(&self, conflict: MigrationConflict) {
        tracing::warn!(
            kind = %conflict.kind,
            session = %conflict.session_id,
            source = %conflict.source_id,
            description = %conflict.description,
            "migration conflict raised"
        );
        self.raised
            .lock()
            .expect("conflict hub poisoned")
            .push(conflict.clone());
        // The receiver may have been dropped after shutdown.
        let _ = self.unresolved_tx.send(conflict);
    }
}
