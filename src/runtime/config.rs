use crate::model::SessionGroupId;
use crate::orchestrator::policy::ConflictPolicy;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_PAGE_SIZE: usize = 10_000;
const DEFAULT_MAX_GROUP_TIME_SPAN: Duration = Duration::from_secs(10 * 60);
const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(10 * 60);
const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Validated orchestration settings for one session group.
///
/// All instances are constructed via [`SyncConfig::builder`] so invariants
/// are checked before any consumer observes the values.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    session_group_id: SessionGroupId,
    poll_interval: Duration,
    page_size: usize,
    max_group_time_span: Duration,
    stop_grace_period: Duration,
    run_timeout: Option<Duration>,
    metrics_interval: Duration,
    conflict_policy: ConflictPolicy,
    link_type_mappings: HashMap<String, String>,
    bidirectional: bool,
}

impl SyncConfig {
    pub fn builder(session_group_id: SessionGroupId) -> SyncConfigBuilder {
        SyncConfigBuilder {
            session_group_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            max_group_time_span: DEFAULT_MAX_GROUP_TIME_SPAN,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            run_timeout: None,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            conflict_policy: ConflictPolicy::default(),
            link_type_mappings: HashMap::new(),
            bidirectional: false,
        }
    }

    pub fn session_group_id(&self) -> SessionGroupId {
        self.session_group_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Widest timestamp spread a single change group may span.
    pub fn max_group_time_span(&self) -> Duration {
        self.max_group_time_span
    }

    /// How long a stopping worker gets before it is force-terminated.
    pub fn stop_grace_period(&self) -> Duration {
        self.stop_grace_period
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Left link type reference name -> right link type reference name.
    pub fn link_type_mappings(&self) -> &HashMap<String, String> {
        &self.link_type_mappings
    }

    pub fn bidirectional(&self) -> bool {
        self.bidirectional
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfigBuilder {
    session_group_id: SessionGroupId,
    poll_interval: Duration,
    page_size: usize,
    max_group_time_span: Duration,
    stop_grace_period: Duration,
    run_timeout: Option<Duration>,
    metrics_interval: Duration,
    conflict_policy: ConflictPolicy,
    link_type_mappings: HashMap<String, String>,
    bidirectional: bool,
}

impl SyncConfigBuilder {
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn max_group_time_span(mut self, max_group_time_span: Duration) -> Self {
        self.max_group_time_span = max_group_time_span;
        self
    }

    pub fn stop_grace_period(mut self, stop_grace_period: Duration) -> Self {
        self.stop_grace_period = stop_grace_period;
        self
    }

    pub fn run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = Some(run_timeout);
        self
    }

    pub fn metrics_interval(mut self, metrics_interval: Duration) -> Self {
        self.metrics_interval = metrics_interval;
        self
    }

    pub fn conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    pub fn map_link_type(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.link_type_mappings.insert(left.into(), right.into());
        self
    }

    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn build(self) -> Result<SyncConfig> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be non-zero");
        }
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }
        if self.max_group_time_span.is_zero() {
            bail!("max_group_time_span must be non-zero");
        }
        if self.stop_grace_period.is_zero() {
            bail!("stop_grace_period must be non-zero");
        }
        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be non-zero");
        }
        if let Some(timeout) = self.run_timeout {
            if timeout.is_zero() {
                bail!("run_timeout must be non-zero when set");
            }
        }
        Ok(SyncConfig {
            session_group_id: self.session_group_id,
            poll_interval: self.poll_interval,
            page_size: self.page_size,
            max_group_time_span: self.max_group_time_span,
            stop_grace_period: self.stop_grace_period,
            run_timeout: self.run_timeout,
            metrics_interval: self.metrics_interval,
            conflict_policy: self.conflict_policy,
            link_type_mappings: self.link_type_mappings,
            bidirectional: self.bidirectional,
        })
    }
}
