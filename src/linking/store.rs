use crate::model::{
    Link, LinkChangeActionStatus, LinkChangeGroup, LinkChangeGroupStatus, LinkChangeKind,
    SourceId,
};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// Slice of a status queue, ordered by store sequence number.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Persistence seam for link change groups, scoped per source side.
pub trait LinkChangeStore: Send + Sync {
    /// Persists a group, assigning its sequence number on first save.
    fn save_group(&self, side: SourceId, group: LinkChangeGroup) -> Result<u64>;

    fn update_group(&self, side: SourceId, group: &LinkChangeGroup) -> Result<()>;

    /// One slice of a side's groups in the given status, deferred groups
    /// filtered to `age <= max_age`, in sequence order.
    fn page_groups(
        &self,
        side: SourceId,
        status: LinkChangeGroupStatus,
        max_age: u32,
        page: PageRequest,
    ) -> Result<Vec<LinkChangeGroup>>;

    fn promote_created_to_in_analysis(&self, side: SourceId) -> Result<usize>;

    /// Re-opens deferred groups whose age is due this pass.
    fn promote_deferred_to_in_analysis(&self, side: SourceId, max_age: u32) -> Result<usize>;

    /// Promotes fully analyzed groups and their translated actions for
    /// migration.
    fn promote_translated_to_ready(&self, side: SourceId) -> Result<usize>;

    /// Whether the side's unmigrated delta already carries an Add for the
    /// same edge.
    fn has_pending_add(&self, side: SourceId, link: &Link) -> Result<bool>;

    /// Marks an unmigrated Add for the same edge as skipped. Returns whether
    /// one was found, in which case the caller drops its Delete as well.
    fn deprecate_pending_add(&self, side: SourceId, link: &Link) -> Result<bool>;
}

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    groups: HashMap<SourceId, Vec<LinkChangeGroup>>,
}

/// In-memory store backing tests and single-process runs.
#[derive(Default)]
pub struct MemoryLinkChangeStore {
    inner: Mutex<StoreInner>,
}

impl MemoryLinkChangeStore {
    /// All groups of one side in sequence order. Test helper.
    pub fn groups(&self, side: SourceId) -> Vec<LinkChangeGroup> {
        let inner = self.inner.lock().expect("link change store poisoned");
        inner.groups.get(&side).cloned().unwrap_or_default()
    }

    fn retag(
        &self,
        side: SourceId,
        from: LinkChangeGroupStatus,
        to: LinkChangeGroupStatus,
        max_age: Option<u32>,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().expect("link change store poisoned");
        let mut touched = 0;
        for group in inner.groups.entry(side).or_default() {
            if group.status() == from && max_age.map_or(true, |max| group.age() <= max) {
                group.set_status(to);
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn pending_add_matching<'a>(
        groups: &'a mut [LinkChangeGroup],
        link: &Link,
    ) -> Option<&'a mut crate::model::LinkChangeAction> {
        groups
            .iter_mut()
            .filter(|g| {
                !matches!(
                    g.status(),
                    LinkChangeGroupStatus::Completed | LinkChangeGroupStatus::Skipped
                )
            })
            .flat_map(|g| g.actions_mut().iter_mut())
            .find(|a| {
                a.kind() == LinkChangeKind::Add
                    && !a.status().is_terminal()
                    && a.link().same_edge(link)
            })
    }
}

impl LinkChangeStore for MemoryLinkChangeStore {
    fn save_group(&self, side: SourceId, mut group: LinkChangeGroup) -> Result<u64> {
        let mut inner = self.inner.lock().expect("link change store poisoned");
        if group.internal_id() == LinkChangeGroup::UNSAVED {
            inner.next_id += 1;
            group.set_internal_id(inner.next_id);
        }
        let id = group.internal_id();
        let groups = inner.groups.entry(side).or_default();
        match groups.iter_mut().find(|g| g.internal_id() == id) {
            Some(existing) => *existing = group,
            None => groups.push(group),
        }
        Ok(id)
    }

    fn update_group(&self, side: SourceId, group: &LinkChangeGroup) -> Result<()> {
        anyhow::ensure!(
            group.internal_id() != LinkChangeGroup::UNSAVED,
            "cannot update an unsaved link change group"
        );
        let mut inner = self.inner.lock().expect("link change store poisoned");
        let groups = inner.groups.entry(side).or_default();
        match groups
            .iter_mut()
            .find(|g| g.internal_id() == group.internal_id())
        {
            Some(existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => anyhow::bail!("unknown link change group {}", group.internal_id()),
        }
    }

    fn page_groups(
        &self,
        side: SourceId,
        status: LinkChangeGroupStatus,
        max_age: u32,
        page: PageRequest,
    ) -> Result<Vec<LinkChangeGroup>> {
        let inner = self.inner.lock().expect("link change store poisoned");
        let Some(groups) = inner.groups.get(&side) else {
            return Ok(Vec::new());
        };
        Ok(groups
            .iter()
            .filter(|g| g.status() == status && g.age() <= max_age)
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn promote_created_to_in_analysis(&self, side: SourceId) -> Result<usize> {
        self.retag(
            side,
            LinkChangeGroupStatus::Created,
            LinkChangeGroupStatus::InAnalysis,
            None,
        )
    }

    fn promote_deferred_to_in_analysis(&self, side: SourceId, max_age: u32) -> Result<usize> {
        self.retag(
            side,
            LinkChangeGroupStatus::InAnalysisDeferred,
            LinkChangeGroupStatus::InAnalysis,
            Some(max_age),
        )
    }

    fn promote_translated_to_ready(&self, side: SourceId) -> Result<usize> {
        let mut inner = self.inner.lock().expect("link change store poisoned");
        let mut touched = 0;
        for group in inner.groups.entry(side).or_default() {
            if group.status() != LinkChangeGroupStatus::InAnalysisTranslated {
                continue;
            }
            group.set_status(LinkChangeGroupStatus::ReadyForMigration);
            for action in group.actions_mut() {
                if action.status() == LinkChangeActionStatus::Translated {
                    action.set_status(LinkChangeActionStatus::ReadyForMigration);
                }
            }
            touched += 1;
        }
        Ok(touched)
    }

    fn has_pending_add(&self, side: SourceId, link: &Link) -> Result<bool> {
        let mut inner = self.inner.lock().expect("link change store poisoned");
        let groups = inner.groups.entry(side).or_default();
        Ok(Self::pending_add_matching(groups, link).is_some())
    }

    fn deprecate_pending_add(&self, side: SourceId, link: &Link) -> Result<bool> {
        let mut inner = self.inner.lock().expect("link change store poisoned");
        let groups = inner.groups.entry(side).or_default();
        match Self::pending_add_matching(groups, link) {
            Some(action) => {
                action.set_status(LinkChangeActionStatus::Skipped);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
