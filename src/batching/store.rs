use crate::model::{ChangeGroup, ChangeGroupStatus, SourceId};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence seam for change groups.
///
/// Status promotions are bulk operations scoped to one source side, matching
/// how delta passes move whole batches through the pipeline.
pub trait ChangeGroupStore: Send + Sync {
    fn save(&self, group: ChangeGroup) -> Result<()>;

    fn load(&self, id: Uuid) -> Result<Option<ChangeGroup>>;

    /// Groups for one source side in execution order, filtered by status.
    fn list_by_status(
        &self,
        source_id: SourceId,
        status: ChangeGroupStatus,
    ) -> Result<Vec<ChangeGroup>>;

    fn update_status(&self, id: Uuid, status: ChangeGroupStatus) -> Result<()>;

    fn promote_analysis_to_pending(&self, source_id: SourceId) -> Result<usize>;

    fn promote_delta_to_delta_pending(&self, source_id: SourceId) -> Result<usize>;

    /// Startup recovery: anything caught mid-flight by a crash goes back to
    /// the work queue.
    fn demote_in_progress_to_pending(&self, source_id: SourceId) -> Result<usize>;

    /// Drops groups still in the Analysis stage, used when a trip is
    /// abandoned before its delta was promoted.
    fn remove_incomplete_groups(&self, source_id: SourceId) -> Result<usize>;
}

/// In-memory store backing tests and single-process runs.
#[derive(Default)]
pub struct MemoryChangeGroupStore {
    groups: Mutex<HashMap<Uuid, ChangeGroup>>,
}

impl MemoryChangeGroupStore {
    /// All saved groups in execution order. Test helper.
    pub fn saved(&self) -> Vec<ChangeGroup> {
        let groups = self.groups.lock().expect("change group store poisoned");
        let mut all: Vec<_> = groups.values().cloned().collect();
        all.sort_by_key(|g| g.execution_order());
        all
    }

    fn retag(
        &self,
        source_id: SourceId,
        from: ChangeGroupStatus,
        to: ChangeGroupStatus,
    ) -> Result<usize> {
        let mut groups = self.groups.lock().expect("change group store poisoned");
        let mut touched = 0;
        for group in groups.values_mut() {
            if group.source_id() == source_id && group.status() == from {
                group.set_status(to);
                touched += 1;
            }
        }
        Ok(touched)
    }
}

impl ChangeGroupStore for MemoryChangeGroupStore {
    fn save(&self, group: ChangeGroup) -> Result<()> {
        let mut groups = self.groups.lock().expect("change group store poisoned");
        groups.insert(group.id(), group);
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Option<ChangeGroup>> {
        let groups = self.groups.lock().expect("change group store poisoned");
        Ok(groups.get(&id).cloned())
    }

    fn list_by_status(
        &self,
        source_id: SourceId,
        status: ChangeGroupStatus,
    ) -> Result<Vec<ChangeGroup>> {
        let groups = self.groups.lock().expect("change group store poisoned");
        let mut matched: Vec<_> = groups
            .values()
            .filter(|g| g.source_id() == source_id && g.status() == status)
            .cloned()
            .collect();
        matched.sort_by_key(|g| g.execution_order());
        Ok(matched)
    }

    fn update_status(&self, id: Uuid, status: ChangeGroupStatus) -> Result<()> {
        let mut groups = self.groups.lock().expect("change group store poisoned");
        match groups.get_mut(&id) {
            Some(group) => {
                group.set_status(status);
                Ok(())
            }
            None => anyhow::bail!("unknown change group {id}"),
        }
    }

    fn promote_analysis_to_pending(&self, source_id: SourceId) -> Result<usize> {
        self.retag(
            source_id,
            ChangeGroupStatus::Analysis,
            ChangeGroupStatus::Pending,
        )
    }

    fn promote_delta_to_delta_pending(&self, source_id: SourceId) -> Result<usize> {
        self.retag(
            source_id,
            ChangeGroupStatus::Delta,
            ChangeGroupStatus::DeltaPending,
        )
    }

    fn demote_in_progress_to_pending(&self, source_id: SourceId) -> Result<usize> {
        self.retag(
            source_id,
            ChangeGroupStatus::InProgress,
            ChangeGroupStatus::Pending,
        )
    }

    fn remove_incomplete_groups(&self, source_id: SourceId) -> Result<usize> {
        let mut groups = self.groups.lock().expect("change group store poisoned");
        let before = groups.len();
        groups.retain(|_, g| {
            !(g.source_id() == source_id && g.status() == ChangeGroupStatus::Analysis)
        });
        Ok(before - groups.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(source_id: SourceId, order: i64, status: ChangeGroupStatus) -> ChangeGroup {
        let mut g = ChangeGroup::new(
            format!("g{order}"),
            "comment",
            "alice",
            order,
            source_id,
        );
        g.set_status(status);
        g
    }

    #[test]
    fn promotions_only_touch_the_named_source_side() {
        let store = MemoryChangeGroupStore::default();
        let left = SourceId::new();
        let right = SourceId::new();
        store
            .save(group(left, 1, ChangeGroupStatus::Analysis))
            .unwrap();
        store
            .save(group(right, 2, ChangeGroupStatus::Analysis))
            .unwrap();

        assert_eq!(store.promote_analysis_to_pending(left).unwrap(), 1);
        assert_eq!(
            store
                .list_by_status(right, ChangeGroupStatus::Analysis)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn recovery_demotes_in_progress() {
        let store = MemoryChangeGroupStore::default();
        let side = SourceId::new();
        store
            .save(group(side, 1, ChangeGroupStatus::InProgress))
            .unwrap();
        store
            .save(group(side, 2, ChangeGroupStatus::Completed))
            .unwrap();

        assert_eq!(store.demote_in_progress_to_pending(side).unwrap(), 1);
        let pending = store
            .list_by_status(side, ChangeGroupStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].execution_order(), 1);
    }

    #[test]
    fn remove_incomplete_drops_only_analysis_groups() {
        let store = MemoryChangeGroupStore::default();
        let side = SourceId::new();
        store
            .save(group(side, 1, ChangeGroupStatus::Analysis))
            .unwrap();
        store
            .save(group(side, 2, ChangeGroupStatus::Pending))
            .unwrap();

        assert_eq!(store.remove_incomplete_groups(side).unwrap(), 1);
        assert_eq!(store.saved().len(), 1);
    }
}
