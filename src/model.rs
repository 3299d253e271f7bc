//! Value types shared across the synchronization core: artifacts, links,
//! migration actions, change groups, and link change batches.

pub mod artifact;
pub mod change;
pub mod link;
pub mod link_change;

pub use artifact::{Artifact, ArtifactType};
pub use change::{ChangeGroup, ChangeGroupStatus, MigrationAction, MigrationActionKind};
pub use link::{Link, LinkChangeKind, LinkTopology, LinkType};
pub use link_change::{
    LinkChangeAction, LinkChangeActionStatus, LinkChangeGroup, LinkChangeGroupStatus,
};

use uuid::Uuid;

/// Unique id of a synchronization session (one left/right source pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub Uuid);

/// Unique id of a session group (the unit the orchestrator drives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionGroupId(pub Uuid);

/// Unique id of a migration source (one side of a session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl SessionGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SessionGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for SessionGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
