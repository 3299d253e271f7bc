use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use syncbridge::model::{Link, LinkChangeGroup, LinkType};
use syncbridge::{LinkAdapter, ReflectionError};

/// Scriptable endpoint-system stand-in.
///
/// Reflection rewrites a configured URI prefix onto the peer's scheme;
/// individual URIs can be scripted to fail or fall outside the path
/// mapping. Existing links, reference closures, and parent lookups are all
/// served from pre-seeded tables.
pub struct MockLinkAdapter {
    reflect_from: String,
    reflect_to: String,
    unmapped: HashSet<String>,
    failing: HashSet<String>,
    supported_types: HashSet<String>,
    existing_links: HashMap<(String, String), Vec<Link>>,
    closure_edges: HashMap<String, Vec<(String, String)>>,
    parents: HashMap<String, Vec<String>>,
    failing_submissions: HashSet<String>,
    delta: Mutex<Vec<LinkChangeGroup>>,
    submitted: Mutex<Vec<LinkChangeGroup>>,
}

impl MockLinkAdapter {
    /// Adapter whose reflection rewrites `reflect_from` prefixes to
    /// `reflect_to`.
    pub fn new(reflect_from: impl Into<String>, reflect_to: impl Into<String>) -> Self {
        Self {
            reflect_from: reflect_from.into(),
            reflect_to: reflect_to.into(),
            unmapped: HashSet::new(),
            failing: HashSet::new(),
            supported_types: HashSet::new(),
            existing_links: HashMap::new(),
            closure_edges: HashMap::new(),
            parents: HashMap::new(),
            failing_submissions: HashSet::new(),
            delta: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn supporting(mut self, reference_name: impl Into<String>) -> Self {
        self.supported_types.insert(reference_name.into());
        self
    }

    /// URIs that reflect as not covered by any path mapping.
    pub fn unmapped(mut self, uri: impl Into<String>) -> Self {
        self.unmapped.insert(uri.into());
        self
    }

    /// URIs whose reflection fails transiently.
    pub fn failing(mut self, uri: impl Into<String>) -> Self {
        self.failing.insert(uri.into());
        self
    }

    /// Seeds a link already present in this system.
    pub fn with_existing_link(mut self, link: Link) -> Self {
        let key = (
            link.source().uri().to_owned(),
            link.link_type().reference_name().to_owned(),
        );
        self.existing_links.entry(key).or_default().push(link);
        self
    }

    /// Seeds the reference closure served for one link type.
    pub fn with_closure_edge(
        mut self,
        reference_name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.closure_edges
            .entry(reference_name.into())
            .or_default()
            .push((source.into(), target.into()));
        self
    }

    /// Seeds an existing parent for a single-parent lookup.
    pub fn with_parent(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.parents
            .entry(child.into())
            .or_default()
            .push(parent.into());
        self
    }

    /// Group names whose submission fails at the endpoint.
    pub fn failing_submission(mut self, group_name: impl Into<String>) -> Self {
        self.failing_submissions.insert(group_name.into());
        self
    }

    /// Queues a delta slice for `next_delta_slice` to hand out.
    pub fn push_delta(&self, group: LinkChangeGroup) {
        self.delta.lock().expect("mock adapter poisoned").push(group);
    }

    pub fn submitted(&self) -> Vec<LinkChangeGroup> {
        self.submitted
            .lock()
            .expect("mock adapter poisoned")
            .clone()
    }
}

impl LinkAdapter for MockLinkAdapter {
    fn reflect_artifact<'a>(
        &'a self,
        uri: &'a str,
    ) -> BoxFuture<'a, Result<String, ReflectionError>> {
        Box::pin(async move {
            if self.unmapped.contains(uri) {
                return Err(ReflectionError::PathNotMapped(uri.to_owned()));
            }
            if self.failing.contains(uri) {
                return Err(ReflectionError::Adapter(anyhow::anyhow!(
                    "endpoint unavailable for {uri}"
                )));
            }
            match uri.strip_prefix(&self.reflect_from) {
                Some(rest) => Ok(format!("{}{rest}", self.reflect_to)),
                None => Err(ReflectionError::Adapter(anyhow::anyhow!(
                    "unexpected uri scheme: {uri}"
                ))),
            }
        })
    }

    fn supports_link_type(&self, reference_name: &str) -> bool {
        self.supported_types.contains(reference_name)
    }

    fn next_delta_slice<'a>(
        &'a self,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<LinkChangeGroup>>> {
        Box::pin(async move {
            let mut delta = self.delta.lock().expect("mock adapter poisoned");
            let take = delta.len().min(limit);
            Ok(delta.drain(..take).collect())
        })
    }

    fn get_links<'a>(
        &'a self,
        artifact_uri: &'a str,
        link_type: &'a LinkType,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Link>>> {
        Box::pin(async move {
            let key = (
                artifact_uri.to_owned(),
                link_type.reference_name().to_owned(),
            );
            Ok(self.existing_links.get(&key).cloned().unwrap_or_default())
        })
    }

    fn single_parent_sources<'a>(
        &'a self,
        link: &'a Link,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move {
            Ok(self
                .parents
                .get(link.target().uri())
                .cloned()
                .unwrap_or_default())
        })
    }

    fn reference_closure<'a>(
        &'a self,
        link_type: &'a LinkType,
        _seed_uri: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<(String, String)>>> {
        Box::pin(async move {
            Ok(self
                .closure_edges
                .get(link_type.reference_name())
                .cloned()
                .unwrap_or_default())
        })
    }

    fn submit_link_change<'a>(
        &'a self,
        group: &'a LinkChangeGroup,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.failing_submissions.contains(group.name()) {
                anyhow::bail!("endpoint rejected group {}", group.name());
            }
            self.submitted
                .lock()
                .expect("mock adapter poisoned")
                .push(group.clone());
            Ok(())
        })
    }
}
