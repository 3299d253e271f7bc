use super::link::{Link, LinkChangeKind};
use uuid::Uuid;

/// Per-action lifecycle inside a [`LinkChangeGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkChangeActionStatus {
    Created,
    Translated,
    Skipped,
    /// Version-control link whose path falls outside the mapped scope.
    SkipScopedOutVcLinks,
    /// Work-item link whose target falls outside the mapped scope.
    SkipScopedOutWiLinks,
    ReadyForMigration,
    Completed,
    /// Source-side action whose translation has been handed to the peer.
    DeltaCompleted,
}

impl LinkChangeActionStatus {
    /// Terminal statuses need no further translation work.
    pub fn needs_translation(self) -> bool {
        matches!(self, LinkChangeActionStatus::Created)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LinkChangeActionStatus::Skipped
                | LinkChangeActionStatus::SkipScopedOutVcLinks
                | LinkChangeActionStatus::SkipScopedOutWiLinks
                | LinkChangeActionStatus::Completed
                | LinkChangeActionStatus::DeltaCompleted
        )
    }
}

/// One intended Add/Edit/Delete of a link, owned by exactly one group.
#[derive(Debug, Clone)]
pub struct LinkChangeAction {
    id: Uuid,
    kind: LinkChangeKind,
    link: Link,
    status: LinkChangeActionStatus,
    conflicted: bool,
}

impl LinkChangeAction {
    pub fn new(kind: LinkChangeKind, link: Link) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            link,
            status: LinkChangeActionStatus::Created,
            conflicted: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> LinkChangeKind {
        self.kind
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn status(&self) -> LinkChangeActionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: LinkChangeActionStatus) {
        self.status = status;
    }

    pub fn conflicted(&self) -> bool {
        self.conflicted
    }

    pub fn set_conflicted(&mut self, conflicted: bool) {
        self.conflicted = conflicted;
    }
}

/// Group-level lifecycle for a batch of link change actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkChangeGroupStatus {
    Created,
    InAnalysis,
    /// Every action translated, skipped, or already terminal.
    InAnalysisTranslated,
    /// At least one action could not be reflected this pass; retried under
    /// the aging policy.
    InAnalysisDeferred,
    ReadyForMigration,
    Completed,
    Skipped,
}

/// A batch of link change actions that moves through analysis and
/// migration as a unit.
#[derive(Debug, Clone)]
pub struct LinkChangeGroup {
    /// Monotonic store sequence number; assigned when first persisted.
    internal_id: u64,
    name: String,
    status: LinkChangeGroupStatus,
    conflicted: bool,
    /// Aging bucket index the group currently sits in (0-based).
    age: u32,
    /// Deferral retries consumed at the current age.
    retries_at_age: u32,
    actions: Vec<LinkChangeAction>,
}

impl LinkChangeGroup {
    pub const UNSAVED: u64 = 0;

    pub fn new(name: impl Into<String>, status: LinkChangeGroupStatus) -> Self {
        Self {
            internal_id: Self::UNSAVED,
            name: name.into(),
            status,
            conflicted: false,
            age: 0,
            retries_at_age: 0,
            actions: Vec::new(),
        }
    }

    pub fn internal_id(&self) -> u64 {
        self.internal_id
    }

    pub fn set_internal_id(&mut self, id: u64) {
        self.internal_id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> LinkChangeGroupStatus {
        self.status
    }

    pub fn set_status(&mut self, status: LinkChangeGroupStatus) {
        self.status = status;
    }

    pub fn conflicted(&self) -> bool {
        self.conflicted
    }

    pub fn set_conflicted(&mut self, conflicted: bool) {
        self.conflicted = conflicted;
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn retries_at_age(&self) -> u32 {
        self.retries_at_age
    }

    pub fn set_aging(&mut self, age: u32, retries_at_age: u32) {
        self.age = age;
        self.retries_at_age = retries_at_age;
    }

    pub fn actions(&self) -> &[LinkChangeAction] {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut [LinkChangeAction] {
        &mut self.actions
    }

    pub fn add_action(&mut self, action: LinkChangeAction) {
        self.actions.push(action);
    }

    /// True when every action is skipped, completed, or delta-completed.
    pub fn is_completed(&self) -> bool {
        self.actions.iter().all(|a| {
            matches!(
                a.status(),
                LinkChangeActionStatus::Skipped
                    | LinkChangeActionStatus::SkipScopedOutVcLinks
                    | LinkChangeActionStatus::SkipScopedOutWiLinks
                    | LinkChangeActionStatus::Completed
                    | LinkChangeActionStatus::DeltaCompleted
            )
        })
    }

    /// True when at least one instruction is pending and every pending
    /// instruction is individually conflicted.
    pub fn all_pending_conflicted(&self) -> bool {
        let mut saw_pending_conflicted = false;
        for action in &self.actions {
            if action.status() == LinkChangeActionStatus::ReadyForMigration {
                if action.conflicted() {
                    saw_pending_conflicted = true;
                } else {
                    return false;
                }
            }
        }
        saw_pending_conflicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Artifact, ArtifactType, LinkTopology, LinkType};

    fn action(status: LinkChangeActionStatus, conflicted: bool) -> LinkChangeAction {
        let at = ArtifactType::new("WorkItem", "Work Item", "WI");
        let link = Link::new(
            Artifact::new("wi://1", at.clone()),
            Artifact::new("wi://2", at),
            LinkType::new("Related", "Related", LinkTopology::Network),
            "",
        );
        let mut a = LinkChangeAction::new(LinkChangeKind::Add, link);
        a.set_status(status);
        a.set_conflicted(conflicted);
        a
    }

    #[test]
    fn completed_when_all_actions_terminal() {
        let mut group = LinkChangeGroup::new("g", LinkChangeGroupStatus::ReadyForMigration);
        group.add_action(action(LinkChangeActionStatus::Skipped, false));
        group.add_action(action(LinkChangeActionStatus::Completed, false));
        assert!(group.is_completed());

        group.add_action(action(LinkChangeActionStatus::ReadyForMigration, false));
        assert!(!group.is_completed());
    }

    #[test]
    fn conflicted_only_when_every_pending_action_is() {
        let mut group = LinkChangeGroup::new("g", LinkChangeGroupStatus::ReadyForMigration);
        group.add_action(action(LinkChangeActionStatus::ReadyForMigration, true));
        group.add_action(action(LinkChangeActionStatus::Skipped, false));
        assert!(group.all_pending_conflicted());

        group.add_action(action(LinkChangeActionStatus::ReadyForMigration, false));
        assert!(!group.all_pending_conflicted());
    }

    #[test]
    fn empty_group_is_not_conflicted() {
        let group = LinkChangeGroup::new("g", LinkChangeGroupStatus::ReadyForMigration);
        assert!(!group.all_pending_conflicted());
        assert!(group.is_completed());
    }
}
