use super::SourceId;
use std::time::SystemTime;
use uuid::Uuid;

/// The intended mutation a single migration action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationActionKind {
    Add,
    Edit,
    Delete,
    Rename,
    Branch,
    Merge,
    BranchMerge,
    Undelete,
    Label,
    AddFileProperties,
}

/// One intended mutation carried inside a [`ChangeGroup`].
///
/// Immutable once its owning group is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationAction {
    pub kind: MigrationActionKind,
    /// Reference to the item on the originating system.
    pub source_item: String,
    pub path: String,
    pub from_path: Option<String>,
    pub version: String,
    pub merge_version_to: Option<String>,
    /// Content type reference name of the item the action touches.
    pub item_type: String,
    /// Opaque payload the owning adapter round-trips untouched.
    pub detail: Option<String>,
    /// Time the change happened on the originating system. `None` means the
    /// system could not supply one; the batcher treats it as unknown.
    pub action_time: Option<SystemTime>,
}

/// Lifecycle status of a [`ChangeGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeGroupStatus {
    /// Being accumulated during delta analysis.
    Analysis,
    /// Saved and waiting for migration.
    Pending,
    /// Delta-table entry awaiting promotion.
    Delta,
    /// Delta-table entry promoted and pending processing.
    DeltaPending,
    /// Picked up by a migration worker.
    InProgress,
    Completed,
    Obsolete,
}

/// An atomically-saved, ordered batch of migration actions.
///
/// All actions in one group share a comment and an owner; no two actions in
/// a still-open group claim the same path or from-path.
#[derive(Debug, Clone)]
pub struct ChangeGroup {
    id: Uuid,
    name: String,
    comment: String,
    owner: String,
    execution_order: i64,
    status: ChangeGroupStatus,
    source_id: SourceId,
    actions: Vec<MigrationAction>,
}

impl ChangeGroup {
    pub fn new(
        name: impl Into<String>,
        comment: impl Into<String>,
        owner: impl Into<String>,
        execution_order: i64,
        source_id: SourceId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            comment: comment.into(),
            owner: owner.into(),
            execution_order,
            status: ChangeGroupStatus::Delta,
            source_id,
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn execution_order(&self) -> i64 {
        self.execution_order
    }

    pub fn status(&self) -> ChangeGroupStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ChangeGroupStatus) {
        self.status = status;
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn actions(&self) -> &[MigrationAction] {
        &self.actions
    }

    pub(crate) fn push_action(&mut self, action: MigrationAction) {
        self.actions.push(action);
    }
}
