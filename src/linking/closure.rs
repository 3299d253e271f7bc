use crate::model::{Link, LinkType};
use std::collections::{HashMap, HashSet};

/// Directed reference graph for one link type, used to detect cycles before
/// changes are handed to the target system.
#[derive(Debug)]
pub struct NonCyclicClosure {
    link_type_reference_name: String,
    /// source URI -> target URIs
    edges: HashMap<String, HashSet<String>>,
    artifacts: HashSet<String>,
}

impl NonCyclicClosure {
    pub fn new(link_type: &LinkType, existing_edges: Vec<(String, String)>) -> Self {
        let mut closure = Self {
            link_type_reference_name: link_type.reference_name().to_owned(),
            edges: HashMap::new(),
            artifacts: HashSet::new(),
        };
        for (source, target) in existing_edges {
            closure.insert_edge(source, target);
        }
        closure
    }

    pub fn link_type_reference_name(&self) -> &str {
        &self.link_type_reference_name
    }

    pub fn contains_artifact(&self, uri: &str) -> bool {
        self.artifacts.contains(uri)
    }

    /// Applies an Add if it keeps the graph acyclic. A rejected Add leaves
    /// the closure unchanged.
    pub fn try_add(&mut self, link: &Link) -> bool {
        let source = link.source().uri();
        let target = link.target().uri();
        if source == target || self.reaches(target, source) {
            return false;
        }
        self.insert_edge(source.to_owned(), target.to_owned());
        true
    }

    pub fn remove(&mut self, link: &Link) {
        if let Some(targets) = self.edges.get_mut(link.source().uri()) {
            targets.remove(link.target().uri());
        }
    }

    fn insert_edge(&mut self, source: String, target: String) {
        self.artifacts.insert(source.clone());
        self.artifacts.insert(target.clone());
        self.edges.entry(source).or_default().insert(target);
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(uri) = stack.pop() {
            if uri == to {
                return true;
            }
            if !seen.insert(uri) {
                continue;
            }
            if let Some(targets) = self.edges.get(uri) {
                stack.extend(targets.iter().map(String::as_str));
            }
        }
        false
    }
}

/// Closures built so far in one analysis pass, keyed by link type.
///
/// A closure is reused for any later link whose endpoints it already knows
/// about; disjoint subgraphs of the same type get their own closures.
#[derive(Debug, Default)]
pub struct ClosureCache {
    closures: HashMap<String, Vec<NonCyclicClosure>>,
}

impl ClosureCache {
    pub fn find_mut(&mut self, link: &Link) -> Option<&mut NonCyclicClosure> {
        let per_type = self
            .closures
            .get_mut(link.link_type().reference_name())?;
        per_type.iter_mut().find(|closure| {
            closure.contains_artifact(link.source().uri())
                || closure.contains_artifact(link.target().uri())
        })
    }

    pub fn insert(&mut self, closure: NonCyclicClosure) -> &mut NonCyclicClosure {
        let per_type = self
            .closures
            .entry(closure.link_type_reference_name().to_owned())
            .or_default();
        per_type.push(closure);
        per_type.last_mut().expect("just pushed")
    }
}
