use crate::linking::adapter::{LinkAdapter, ReflectionError};
use crate::linking::aging::TranslationAging;
use crate::linking::closure::{ClosureCache, NonCyclicClosure};
use crate::linking::store::{LinkChangeStore, PageRequest};
use crate::model::{
    Artifact, Link, LinkChangeAction, LinkChangeActionStatus, LinkChangeGroup,
    LinkChangeGroupStatus, LinkChangeKind, LinkType, SessionId, SourceId,
};
use crate::runtime::conflict::{ConflictKind, ConflictSink, MigrationConflict};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Upper bound on link change actions pulled into one processing slice.
pub const MAX_ACTIONS_PER_SLICE: usize = 10_000;

/// One side of the migration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkEngineConfig {
    pub page_size: usize,
    /// Both sides run their own delta analysis; the reverse translation
    /// phase is then owned by the peer's pass.
    pub bidirectional: bool,
    /// Left link type reference name -> right link type reference name.
    /// Types absent here map to themselves when the peer supports them.
    pub link_type_mappings: HashMap<String, String>,
}

impl Default for LinkEngineConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_ACTIONS_PER_SLICE,
            bidirectional: false,
            link_type_mappings: HashMap::new(),
        }
    }
}

pub struct LinkEngineParams {
    pub session_id: SessionId,
    pub left_source: SourceId,
    pub right_source: SourceId,
    pub left_adapter: Arc<dyn LinkAdapter>,
    pub right_adapter: Arc<dyn LinkAdapter>,
    pub store: Arc<dyn LinkChangeStore>,
    pub conflicts: Arc<dyn ConflictSink>,
    pub telemetry: Arc<Telemetry>,
    pub config: LinkEngineConfig,
}

enum TranslationOutcome {
    Translated(LinkChangeAction),
    Skipped,
    Deferred,
}

/// Drives link change groups from raw deltas to migrated links.
///
/// A full analysis pass translates one side's delta onto the peer, runs the
/// peer adapter's own analysis, rejects changes that would break the link
/// topology, and finally promotes surviving groups for migration.
pub struct LinkEngine {
    session_id: SessionId,
    left_source: SourceId,
    right_source: SourceId,
    left_adapter: Arc<dyn LinkAdapter>,
    right_adapter: Arc<dyn LinkAdapter>,
    store: Arc<dyn LinkChangeStore>,
    conflicts: Arc<dyn ConflictSink>,
    telemetry: Arc<Telemetry>,
    config: LinkEngineConfig,
    /// Each side defers and retries on its own schedule, keyed by source.
    aging: Mutex<HashMap<SourceId, TranslationAging>>,
}

impl LinkEngine {
    pub fn new(params: LinkEngineParams) -> Self {
        let LinkEngineParams {
            session_id,
            left_source,
            right_source,
            left_adapter,
            right_adapter,
            store,
            conflicts,
            telemetry,
            config,
        } = params;
        Self {
            session_id,
            left_source,
            right_source,
            left_adapter,
            right_adapter,
            store,
            conflicts,
            telemetry,
            config,
            aging: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_aging_for(self, source: SourceId, aging: TranslationAging) -> Self {
        self.aging
            .lock()
            .expect("aging schedule poisoned")
            .insert(source, aging);
        self
    }

    fn source_of(&self, side: Side) -> SourceId {
        match side {
            Side::Left => self.left_source,
            Side::Right => self.right_source,
        }
    }

    fn adapter_of(&self, side: Side) -> &Arc<dyn LinkAdapter> {
        match side {
            Side::Left => &self.left_adapter,
            Side::Right => &self.right_adapter,
        }
    }

    fn map_link_type(&self, side: Side, link_type: &LinkType) -> Option<LinkType> {
        let reference_name = link_type.reference_name();
        let mapped = match side {
            Side::Left => self.config.link_type_mappings.get(reference_name).cloned(),
            Side::Right => self
                .config
                .link_type_mappings
                .iter()
                .find(|(_, right)| right.as_str() == reference_name)
                .map(|(left, _)| left.clone()),
        };
        match mapped {
            Some(peer_name) => Some(LinkType::new(
                peer_name,
                link_type.friendly_name(),
                link_type.topology(),
            )),
            None if self
                .adapter_of(side.peer())
                .supports_link_type(reference_name) =>
            {
                Some(link_type.clone())
            }
            None => None,
        }
    }

    /// Drains a side's adapter of newly discovered link changes into the
    /// store. Returns the number of groups captured.
    pub async fn generate_delta(&self, side: Side) -> Result<usize> {
        let source = self.source_of(side);
        let mut captured = 0;
        loop {
            let groups = self
                .adapter_of(side)
                .next_delta_slice(self.config.page_size)
                .await?;
            if groups.is_empty() {
                return Ok(captured);
            }
            for group in groups {
                self.store.save_group(source, group)?;
                captured += 1;
            }
        }
    }

    /// Full analysis pass for one side's accumulated link delta.
    pub async fn analyze_link_delta(&self, side: Side) -> Result<()> {
        self.translate_side(side).await?;
        if !self.config.bidirectional {
            self.translate_side(side.peer()).await?;
        }
        self.run_adapter_analysis(side.peer()).await?;
        self.detect_cycles(side.peer()).await?;
        self.analyze_single_parents(side.peer()).await?;
        self.store
            .promote_translated_to_ready(self.source_of(side.peer()))?;
        Ok(())
    }

    async fn translate_side(&self, side: Side) -> Result<()> {
        let source = self.source_of(side);
        let max_age = self
            .aging
            .lock()
            .expect("aging schedule poisoned")
            .entry(source)
            .or_insert_with(TranslationAging::new)
            .max_age_for_translation(Instant::now());
        self.store.promote_created_to_in_analysis(source)?;
        self.store.promote_deferred_to_in_analysis(source, max_age)?;

        loop {
            let groups = self.store.page_groups(
                source,
                LinkChangeGroupStatus::InAnalysis,
                max_age,
                PageRequest::first(self.config.page_size),
            )?;
            if groups.is_empty() {
                break;
            }
            for mut group in groups {
                let peer_actions = self.translate_group(side, &mut group).await;
                self.save_translation_result(side, group, peer_actions)?;
            }
        }
        Ok(())
    }

    /// Translates every untranslated action in place, collecting the
    /// rewritten actions destined for the peer side.
    async fn translate_group(
        &self,
        side: Side,
        group: &mut LinkChangeGroup,
    ) -> Vec<LinkChangeAction> {
        let mut peer_actions = Vec::new();
        let session_id = self.session_id;
        let source = self.source_of(side);
        for action in group.actions_mut() {
            if !action.status().needs_translation() {
                continue;
            }
            match self.translate_action(side, action).await {
                Ok(TranslationOutcome::Translated(peer_action)) => {
                    action.set_status(LinkChangeActionStatus::Translated);
                    self.telemetry.record_actions_translated(1);
                    peer_actions.push(peer_action);
                }
                Ok(TranslationOutcome::Skipped) => {
                    action.set_status(LinkChangeActionStatus::Skipped);
                    self.telemetry.record_action_skipped();
                }
                Ok(TranslationOutcome::Deferred) => {
                    self.telemetry.record_action_deferred();
                }
                Err(err) => {
                    self.telemetry.record_action_deferred();
                    tracing::warn!(
                        session = %session_id,
                        source = %source,
                        action = %action.id(),
                        error = %err,
                        "link change action translation failed, deferring"
                    );
                }
            }
        }
        peer_actions
    }

    async fn translate_action(
        &self,
        side: Side,
        action: &LinkChangeAction,
    ) -> Result<TranslationOutcome> {
        let adapter = self.adapter_of(side);
        let link = action.link();

        let reflected_source = match adapter.reflect_artifact(link.source().uri()).await {
            Ok(uri) => uri,
            Err(err) => {
                tracing::debug!(uri = link.source().uri(), error = %err, "source reflection failed");
                return Ok(TranslationOutcome::Deferred);
            }
        };
        let reflected_target = match adapter.reflect_artifact(link.target().uri()).await {
            Ok(uri) => uri,
            Err(ReflectionError::PathNotMapped(_)) => return Ok(TranslationOutcome::Skipped),
            Err(err) => {
                tracing::debug!(uri = link.target().uri(), error = %err, "target reflection failed");
                return Ok(TranslationOutcome::Deferred);
            }
        };

        let Some(peer_type) = self.map_link_type(side, link.link_type()) else {
            return Ok(TranslationOutcome::Skipped);
        };

        let peer_link = Link::new(
            Artifact::new(reflected_source, link.source().artifact_type().clone()),
            Artifact::new(reflected_target, link.target().artifact_type().clone()),
            peer_type,
            link.comment(),
        )
        .with_locked(link.locked());

        let peer_source = self.source_of(side.peer());
        let mut kind = action.kind();
        match kind {
            LinkChangeKind::Add => {
                if self.store.has_pending_add(peer_source, &peer_link)? {
                    return Ok(TranslationOutcome::Skipped);
                }
                match self.find_existing_link(side.peer(), &peer_link).await? {
                    Some(existing) if existing.locked() == peer_link.locked() => {
                        return Ok(TranslationOutcome::Skipped);
                    }
                    Some(_) => {
                        // same edge with a different lock state: migrate as
                        // an edit instead of a duplicate add
                        kind = LinkChangeKind::Edit;
                    }
                    None => {}
                }
            }
            LinkChangeKind::Delete => {
                if self.store.deprecate_pending_add(peer_source, &peer_link)? {
                    return Ok(TranslationOutcome::Skipped);
                }
            }
            LinkChangeKind::Edit => {}
        }

        let mut peer_action = LinkChangeAction::new(kind, peer_link);
        peer_action.set_status(LinkChangeActionStatus::Translated);
        Ok(TranslationOutcome::Translated(peer_action))
    }

    async fn find_existing_link(&self, side: Side, link: &Link) -> Result<Option<Link>> {
        let mut links = self
            .adapter_of(side)
            .get_links(link.source().uri(), link.link_type())
            .await?;
        links.sort_by(|a, b| a.identity_cmp(b));
        match links.binary_search_by(|candidate| candidate.identity_cmp(link)) {
            Ok(idx) => Ok(Some(links.swap_remove(idx))),
            Err(_) => Ok(None),
        }
    }

    /// Persists what translation did to a group: translated actions move to
    /// a fresh peer-side group, anything still untranslated sends the source
    /// group back through the aging schedule.
    fn save_translation_result(
        &self,
        side: Side,
        mut group: LinkChangeGroup,
        peer_actions: Vec<LinkChangeAction>,
    ) -> Result<()> {
        for action in group.actions_mut() {
            if action.status() == LinkChangeActionStatus::Translated {
                action.set_status(LinkChangeActionStatus::DeltaCompleted);
            }
        }

        if group.actions().iter().all(|a| a.status().is_terminal()) {
            group.set_status(LinkChangeGroupStatus::Completed);
        } else {
            group.set_status(LinkChangeGroupStatus::InAnalysisDeferred);
            self.aging
                .lock()
                .expect("aging schedule poisoned")
                .entry(self.source_of(side))
                .or_insert_with(TranslationAging::new)
                .record_deferral(&mut group);
        }
        self.store.update_group(self.source_of(side), &group)?;

        if !peer_actions.is_empty() {
            let mut peer_group = LinkChangeGroup::new(
                group.name(),
                LinkChangeGroupStatus::InAnalysisTranslated,
            );
            for action in peer_actions {
                peer_group.add_action(action);
            }
            self.store
                .save_group(self.source_of(side.peer()), peer_group)?;
        }
        Ok(())
    }

    async fn run_adapter_analysis(&self, side: Side) -> Result<()> {
        let source = self.source_of(side);
        let mut page = PageRequest::first(self.config.page_size);
        loop {
            let mut groups = self.store.page_groups(
                source,
                LinkChangeGroupStatus::InAnalysisTranslated,
                u32::MAX,
                page,
            )?;
            if groups.is_empty() {
                return Ok(());
            }
            if let Err(err) = self.adapter_of(side).analyze(&mut groups).await {
                for group in &mut groups {
                    self.quarantine_group(side, group, &err);
                }
            }
            for group in &groups {
                self.store.update_group(source, group)?;
            }
            page = page.next();
        }
    }

    /// Rejects translated changes that would close a cycle in a
    /// non-circular link topology.
    async fn detect_cycles(&self, side: Side) -> Result<()> {
        let source = self.source_of(side);
        let mut cache = ClosureCache::default();
        let mut page = PageRequest::first(self.config.page_size);
        loop {
            let groups = self.store.page_groups(
                source,
                LinkChangeGroupStatus::InAnalysisTranslated,
                u32::MAX,
                page,
            )?;
            if groups.is_empty() {
                return Ok(());
            }
            for mut group in groups {
                if let Err(err) = self
                    .replay_group_on_closures(side, &mut cache, &mut group)
                    .await
                {
                    self.quarantine_group(side, &mut group, &err);
                }
                self.store.update_group(source, &group)?;
            }
            page = page.next();
        }
    }

    async fn replay_group_on_closures(
        &self,
        side: Side,
        cache: &mut ClosureCache,
        group: &mut LinkChangeGroup,
    ) -> Result<()> {
        let mut conflicted_any = false;
        for action in group.actions_mut() {
            if action.status().is_terminal()
                || action.conflicted()
                || !action.link().link_type().topology().non_circular()
            {
                continue;
            }
            let link = action.link().clone();
            let closure = if cache.find_mut(&link).is_some() {
                cache.find_mut(&link).expect("closure matched above")
            } else {
                let edges = self
                    .adapter_of(side)
                    .reference_closure(link.link_type(), link.source().uri())
                    .await?;
                cache.insert(NonCyclicClosure::new(link.link_type(), edges))
            };
            match action.kind() {
                LinkChangeKind::Add => {
                    if !closure.try_add(&link) {
                        action.set_conflicted(true);
                        conflicted_any = true;
                        self.conflicts.raise(MigrationConflict {
                            kind: ConflictKind::CyclicLinkReference,
                            session_id: self.session_id,
                            source_id: self.source_of(side),
                            description: format!(
                                "adding {} -> {} would close a cycle in {}",
                                link.source().uri(),
                                link.target().uri(),
                                link.link_type().reference_name()
                            ),
                            link: Some(link),
                        });
                    }
                }
                LinkChangeKind::Delete => closure.remove(&link),
                LinkChangeKind::Edit => {}
            }
        }
        if conflicted_any {
            group.set_conflicted(true);
        }
        Ok(())
    }

    /// Routes an adapter failure to the conflict sink and holds the group's
    /// unfinished actions for resolution, so the rest of the pass keeps going.
    fn quarantine_group(&self, side: Side, group: &mut LinkChangeGroup, err: &anyhow::Error) {
        for action in group.actions_mut() {
            if !action.status().is_terminal() {
                action.set_conflicted(true);
            }
        }
        group.set_conflicted(true);
        self.conflicts.raise(MigrationConflict {
            kind: ConflictKind::AdapterFailure,
            session_id: self.session_id,
            source_id: self.source_of(side),
            description: format!("adapter analysis of group {} failed: {err:#}", group.name()),
            link: None,
        });
    }

    /// Skips adds that would attach a second parent in a single-parent
    /// topology, raising a conflict for each.
    async fn analyze_single_parents(&self, side: Side) -> Result<()> {
        let source = self.source_of(side);
        let mut page = PageRequest::first(self.config.page_size);
        loop {
            let groups = self.store.page_groups(
                source,
                LinkChangeGroupStatus::InAnalysisTranslated,
                u32::MAX,
                page,
            )?;
            if groups.is_empty() {
                return Ok(());
            }
            for mut group in groups {
                for action in group.actions_mut() {
                    let eligible = action.kind() == LinkChangeKind::Add
                        && action.status() == LinkChangeActionStatus::Translated
                        && !action.conflicted()
                        && action.link().link_type().topology().single_parent();
                    if !eligible {
                        continue;
                    }
                    let parents = match self
                        .adapter_of(side)
                        .single_parent_sources(action.link())
                        .await
                    {
                        Ok(parents) => parents,
                        Err(err) => {
                            action.set_conflicted(true);
                            self.conflicts.raise(MigrationConflict {
                                kind: ConflictKind::AdapterFailure,
                                session_id: self.session_id,
                                source_id: source,
                                description: format!(
                                    "parent lookup for {} failed: {err:#}",
                                    action.link().target().uri()
                                ),
                                link: Some(action.link().clone()),
                            });
                            continue;
                        }
                    };
                    if !parents.is_empty() {
                        action.set_status(LinkChangeActionStatus::Skipped);
                        self.conflicts.raise(MigrationConflict {
                            kind: ConflictKind::SingleParentViolation,
                            session_id: self.session_id,
                            source_id: source,
                            description: format!(
                                "{} already has a parent ({}) under {}",
                                action.link().target().uri(),
                                parents.join(", "),
                                action.link().link_type().reference_name()
                            ),
                            link: Some(action.link().clone()),
                        });
                    }
                }
                self.store.update_group(source, &group)?;
            }
            page = page.next();
        }
    }

    /// Applies every group promoted for migration to the side's system.
    pub async fn migrate_links(&self, side: Side) -> Result<()> {
        let source = self.source_of(side);

        // collect first: completed groups leave the status queue, which
        // would otherwise shift pages under us
        let mut pending = Vec::new();
        let mut page = PageRequest::first(self.config.page_size);
        loop {
            let groups = self.store.page_groups(
                source,
                LinkChangeGroupStatus::ReadyForMigration,
                u32::MAX,
                page,
            )?;
            let short_page = groups.len() < page.limit;
            pending.extend(groups);
            if short_page {
                break;
            }
            page = page.next();
        }

        for mut group in pending {
            if group.is_completed() {
                group.set_status(LinkChangeGroupStatus::Completed);
                self.store.update_group(source, &group)?;
                continue;
            }
            if group.all_pending_conflicted() {
                group.set_conflicted(true);
                self.store.update_group(source, &group)?;
                continue;
            }
            let group_id = group.internal_id();
            for action in group.actions_mut() {
                if action.status() != LinkChangeActionStatus::ReadyForMigration
                    || action.conflicted()
                {
                    continue;
                }
                let link = action.link();
                if link.source().uri().is_empty() || link.target().uri().is_empty() {
                    tracing::warn!(
                        group = group_id,
                        action = %action.id(),
                        "dropping link change with an empty endpoint uri"
                    );
                    action.set_status(LinkChangeActionStatus::Skipped);
                }
            }
            if let Err(err) = self.adapter_of(side).submit_link_change(&group).await {
                // the group stays ReadyForMigration for the next pass
                self.conflicts.raise(MigrationConflict {
                    kind: ConflictKind::AdapterFailure,
                    session_id: self.session_id,
                    source_id: source,
                    description: format!(
                        "submitting group {} failed: {err:#}",
                        group.name()
                    ),
                    link: None,
                });
                continue;
            }
            for action in group.actions_mut() {
                if action.status() == LinkChangeActionStatus::ReadyForMigration
                    && !action.conflicted()
                {
                    action.set_status(LinkChangeActionStatus::Completed);
                }
            }
            let status = if group.is_completed() {
                LinkChangeGroupStatus::Completed
            } else {
                LinkChangeGroupStatus::ReadyForMigration
            };
            group.set_status(status);
            self.store.update_group(source, &group)?;
            self.telemetry.record_group_migrated();
            tracing::info!(
                session = %self.session_id,
                source = %source,
                group = group_id,
                "link change group migrated"
            );
        }
        Ok(())
    }
}
