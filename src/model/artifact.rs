use std::cmp::Ordering;

/// Describes the kind of resource an [`Artifact`] address points at,
/// e.g. a work item, a changeset, or a version-controlled item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactType {
    reference_name: String,
    friendly_name: String,
    content_type: String,
}

impl ArtifactType {
    pub fn new(
        reference_name: impl Into<String>,
        friendly_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            friendly_name: friendly_name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Content type reference name, used to route reflection lookups to the
    /// session type (work-item vs version-control) that owns the artifact.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl PartialOrd for ArtifactType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArtifactType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference_name.cmp(&other.reference_name)
    }
}

/// An address plus type identifying a resource on either system.
///
/// Value type; two artifacts are the same resource iff their uri and type
/// reference name are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact {
    uri: String,
    artifact_type: ArtifactType,
}

impl Artifact {
    pub fn new(uri: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            uri: uri.into(),
            artifact_type,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn artifact_type(&self) -> &ArtifactType {
        &self.artifact_type
    }
}

impl PartialOrd for Artifact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Artifact {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri
            .cmp(&other.uri)
            .then_with(|| self.artifact_type.cmp(&other.artifact_type))
    }
}
