use crate::batching::store::ChangeGroupStore;
use crate::model::{ChangeGroup, MigrationAction, MigrationActionKind, SourceId};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Actions further apart than this never share a group.
pub const MAX_GROUP_TIME_SPAN: Duration = Duration::from_secs(10 * 60);

/// Inputs for one [`ChangeBatcher::add_action`] call.
///
/// `action_time` of `None` marks an unknown timestamp and disables the
/// time-window check for that comparison.
#[derive(Debug, Clone)]
pub struct AddActionParams {
    pub group_name: String,
    pub comment: String,
    pub owner: String,
    pub execution_order: i64,
    pub kind: MigrationActionKind,
    pub source_item: String,
    pub from_path: Option<String>,
    pub path: String,
    pub version: String,
    pub merge_version_to: Option<String>,
    pub item_type: String,
    pub detail: Option<String>,
    pub action_time: Option<SystemTime>,
}

/// Result of adding one action: the group it landed in and, when the add
/// forced a split, the group that was flushed to the store.
#[derive(Debug)]
pub struct BatchedAction {
    pub active_group_id: uuid::Uuid,
    pub closed_group: Option<ChangeGroup>,
}

/// Accumulates migration actions into change groups.
///
/// One group is open at a time. An incoming action closes it when its path
/// or from-path collides with a path already claimed by the group, when the
/// comment or owner differs, or when its timestamp runs more than
/// [`MAX_GROUP_TIME_SPAN`] past the latest action already grouped. A flushed
/// group is never reopened; later status changes go through the
/// [`ChangeGroupStore`] promote/demote operations.
///
/// The claimed-path set and latest timestamp are only ever touched by the
/// single producer feeding this batcher.
pub struct ChangeBatcher {
    source_id: SourceId,
    store: Arc<dyn ChangeGroupStore>,
    max_span: Duration,
    open_group: Option<ChangeGroup>,
    claimed_paths: HashSet<String>,
    latest_action_time: Option<SystemTime>,
    telemetry: Option<Arc<Telemetry>>,
}

impl ChangeBatcher {
    pub fn new(source_id: SourceId, store: Arc<dyn ChangeGroupStore>) -> Self {
        Self::with_max_span(source_id, store, MAX_GROUP_TIME_SPAN)
    }

    pub fn with_max_span(
        source_id: SourceId,
        store: Arc<dyn ChangeGroupStore>,
        max_span: Duration,
    ) -> Self {
        Self {
            source_id,
            store,
            max_span,
            open_group: None,
            claimed_paths: HashSet::new(),
            latest_action_time: None,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Appends an action, splitting the open group first when any grouping
    /// rule would be violated. Returns the flushed group, if any.
    pub fn add_action(&mut self, params: AddActionParams) -> Result<BatchedAction> {
        let closed_group = if self.open_group.is_none() {
            self.open_fresh_group(&params);
            None
        } else if self.must_split(&params) {
            let closed = self.flush_open_group()?;
            self.open_fresh_group(&params);
            closed
        } else {
            None
        };

        let group = self
            .open_group
            .as_mut()
            .expect("an open group exists after open_fresh_group");

        group.push_action(MigrationAction {
            kind: params.kind,
            source_item: params.source_item,
            path: params.path.clone(),
            from_path: params.from_path.clone(),
            version: params.version,
            merge_version_to: params.merge_version_to,
            item_type: params.item_type,
            detail: params.detail,
            action_time: params.action_time,
        });

        self.claimed_paths.insert(params.path);
        if let Some(from_path) = params.from_path.filter(|p| !p.is_empty()) {
            self.claimed_paths.insert(from_path);
        }
        self.latest_action_time = params.action_time;

        Ok(BatchedAction {
            active_group_id: group.id(),
            closed_group,
        })
    }

    /// Force-closes the open group, used at the end of a delta pass.
    pub fn flush(&mut self) -> Result<Option<ChangeGroup>> {
        self.flush_open_group()
    }

    pub fn has_open_group(&self) -> bool {
        self.open_group.is_some()
    }

    fn must_split(&self, params: &AddActionParams) -> bool {
        let group = self
            .open_group
            .as_ref()
            .expect("must_split is only called with an open group");

        if self.claimed_paths.contains(&params.path) {
            return true;
        }
        if let Some(from_path) = params.from_path.as_deref() {
            if !from_path.is_empty() && self.claimed_paths.contains(from_path) {
                return true;
            }
        }
        if params.comment != group.comment() || params.owner != group.owner() {
            return true;
        }
        // Only a forward jump past the window splits; unknown timestamps on
        // either side disable the check.
        if let (Some(latest), Some(incoming)) = (self.latest_action_time, params.action_time) {
            if let Ok(elapsed) = incoming.duration_since(latest) {
                if elapsed > self.max_span {
                    return true;
                }
            }
        }

        false
    }

    fn open_fresh_group(&mut self, params: &AddActionParams) {
        self.claimed_paths.clear();
        self.open_group = Some(ChangeGroup::new(
            params.group_name.clone(),
            params.comment.clone(),
            params.owner.clone(),
            params.execution_order,
            self.source_id,
        ));
    }

    fn flush_open_group(&mut self) -> Result<Option<ChangeGroup>> {
        let Some(group) = self.open_group.take() else {
            return Ok(None);
        };
        self.claimed_paths.clear();
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_group_flushed(group.actions().len() as u64);
        }
        tracing::debug!(
            group = %group.id(),
            actions = group.actions().len(),
            "flushing change group"
        );
        self.store.save(group.clone())?;
        Ok(Some(group))
    }
}
