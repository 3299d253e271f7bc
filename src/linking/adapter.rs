use crate::model::{Link, LinkChangeGroup, LinkType};
use futures::future::BoxFuture;

/// Failure to reflect an artifact URI onto the peer system.
#[derive(Debug)]
pub enum ReflectionError {
    /// The artifact lives under a path the session does not map. Actions
    /// targeting such artifacts are skipped rather than retried.
    PathNotMapped(String),
    /// Transient or unexpected adapter failure. Actions hitting this are
    /// deferred and retried on the aging schedule.
    Adapter(anyhow::Error),
}

impl std::fmt::Display for ReflectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReflectionError::PathNotMapped(uri) => {
                write!(f, "artifact {uri} is not covered by a path mapping")
            }
            ReflectionError::Adapter(err) => write!(f, "adapter reflection failed: {err}"),
        }
    }
}

impl std::error::Error for ReflectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReflectionError::PathNotMapped(_) => None,
            ReflectionError::Adapter(err) => Some(err.as_ref()),
        }
    }
}

/// Endpoint-system integration surface for link analysis and migration.
///
/// One adapter per side of a session. All URIs an adapter receives are in
/// its own system's addressing scheme except where noted.
pub trait LinkAdapter: Send + Sync {
    /// Translates a URI from this adapter's system into the peer system's
    /// addressing scheme.
    fn reflect_artifact<'a>(
        &'a self,
        uri: &'a str,
    ) -> BoxFuture<'a, Result<String, ReflectionError>>;

    /// Whether this system can host links of the given type reference name.
    fn supports_link_type(&self, reference_name: &str) -> bool;

    /// Next slice of link changes discovered in this system since the last
    /// call, already batched into groups. Empty means the delta is drained.
    fn next_delta_slice<'a>(
        &'a self,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<LinkChangeGroup>>>;

    /// Current links of one type attached to an artifact, unordered.
    fn get_links<'a>(
        &'a self,
        artifact_uri: &'a str,
        link_type: &'a LinkType,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Link>>>;

    /// Existing parents of the link target for a single-parent topology.
    /// Non-empty means the incoming Add would attach a second parent.
    fn single_parent_sources<'a>(
        &'a self,
        link: &'a Link,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>>;

    /// Reference closure of one link type reachable from a seed artifact,
    /// as (source URI, target URI) edges already present in this system.
    fn reference_closure<'a>(
        &'a self,
        link_type: &'a LinkType,
        seed_uri: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<(String, String)>>>;

    /// System-specific analysis pass over translated groups, run after
    /// translation and before topology checks. May mark actions skipped or
    /// conflicted in place. The default does nothing.
    fn analyze<'a>(
        &'a self,
        _groups: &'a mut [LinkChangeGroup],
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Applies a fully validated group of link changes to this system.
    fn submit_link_change<'a>(
        &'a self,
        group: &'a LinkChangeGroup,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}
