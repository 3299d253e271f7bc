use super::artifact::Artifact;
use std::cmp::Ordering;

/// Topology constraints a link type imposes on the set of links of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkTopology {
    /// No constraint.
    Network,
    /// Directed edges, cycles allowed.
    DirectedNetwork,
    /// Directed and acyclic.
    Dependency,
    /// Directed, acyclic, and every target has at most one incoming link.
    Tree,
}

impl LinkTopology {
    pub fn directed(self) -> bool {
        !matches!(self, LinkTopology::Network)
    }

    pub fn non_circular(self) -> bool {
        matches!(self, LinkTopology::Dependency | LinkTopology::Tree)
    }

    pub fn single_parent(self) -> bool {
        matches!(self, LinkTopology::Tree)
    }
}

/// A named, typed edge kind between two artifact types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkType {
    reference_name: String,
    friendly_name: String,
    topology: LinkTopology,
}

impl LinkType {
    pub fn new(
        reference_name: impl Into<String>,
        friendly_name: impl Into<String>,
        topology: LinkTopology,
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            friendly_name: friendly_name.into(),
            topology,
        }
    }

    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn topology(&self) -> LinkTopology {
        self.topology
    }
}

/// The change a [`crate::model::LinkChangeAction`] intends for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkChangeKind {
    Add,
    Edit,
    Delete,
}

/// A directed reference from one artifact to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    source: Artifact,
    target: Artifact,
    link_type: LinkType,
    comment: String,
    locked: bool,
}

impl Link {
    pub fn new(
        source: Artifact,
        target: Artifact,
        link_type: LinkType,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            link_type,
            comment: comment.into(),
            locked: false,
        }
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn source(&self) -> &Artifact {
        &self.source
    }

    pub fn target(&self) -> &Artifact {
        &self.target
    }

    pub fn link_type(&self) -> &LinkType {
        &self.link_type
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Ordering used for the de-duplication binary search: link type
    /// reference name, then source uri, then target uri. Comment and lock
    /// flag do not participate.
    pub fn identity_cmp(&self, other: &Self) -> Ordering {
        self.link_type
            .reference_name()
            .cmp(other.link_type.reference_name())
            .then_with(|| self.source.uri().cmp(other.source.uri()))
            .then_with(|| self.target.uri().cmp(other.target.uri()))
    }

    /// Two links denote the same edge when their identity ordering is equal.
    pub fn same_edge(&self, other: &Self) -> bool {
        self.identity_cmp(other) == Ordering::Equal
    }
}
