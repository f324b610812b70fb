//! Causal graph model: a validated, immutable `node -> parents` DAG.
//!
//! Construction runs the same repeated-pass resolver the simulator uses, with no
//! data attached, so a graph that builds is guaranteed to resolve.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parsed graph notation: node name to ordered parent names.
pub type GraphSpec = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphDefinitionError {
    #[error("graph has no nodes")]
    Empty,
    #[error("node name {0:?} is empty or contains a comma, quote or line break")]
    InvalidName(String),
    #[error("node '{node}' lists unknown parent '{parent}'")]
    UnknownParent { node: String, parent: String },
    #[error("node '{node}' lists parent '{parent}' more than once")]
    DuplicateParent { node: String, parent: String },
    #[error("graph contains a cycle through: {}", unresolved.join(", "))]
    Cycle { unresolved: Vec<String> },
}

/// A resolver pass made no progress; these nodes are still waiting on parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Stalled {
    pub unresolved: Vec<String>,
    pub passes: usize,
}

/// Resolve nodes in repeated passes over the unresolved set.
///
/// A node resolves once every parent is resolved; resolution within a pass is
/// visible to later nodes of the same pass. `visit` is called once per node in
/// resolution order. Returns the number of passes taken, or `Stalled` as soon as
/// one full pass resolves nothing.
pub(crate) fn resolve_in_passes<F>(parents: &GraphSpec, mut visit: F) -> Result<usize, Stalled>
where
    F: FnMut(&str, &[String]),
{
    let mut unresolved: BTreeSet<&str> = parents.keys().map(String::as_str).collect();
    let mut resolved: BTreeSet<&str> = BTreeSet::new();
    let mut passes = 0usize;

    while !unresolved.is_empty() {
        passes += 1;
        let mut progressed = false;
        let pending: Vec<&str> = unresolved.iter().copied().collect();
        for node in pending {
            let node_parents = &parents[node];
            if node_parents.iter().all(|p| resolved.contains(p.as_str())) {
                visit(node, node_parents.as_slice());
                unresolved.remove(node);
                resolved.insert(node);
                progressed = true;
            }
        }
        if !progressed {
            return Err(Stalled {
                unresolved: unresolved.iter().map(|s| s.to_string()).collect(),
                passes,
            });
        }
    }
    Ok(passes)
}

/// Node names become CSV header fields and are written unquoted.
fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty() && !name.contains([',', '"', '\n', '\r'])
}

/// Validated acyclic dependency graph. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GraphSpec", into = "GraphSpec")]
pub struct CausalGraph {
    parents: GraphSpec,
    order: Vec<String>,
}

impl CausalGraph {
    pub fn new(parents: GraphSpec) -> Result<Self, GraphDefinitionError> {
        if parents.is_empty() {
            return Err(GraphDefinitionError::Empty);
        }
        if let Some(bad) = parents.keys().find(|n| !is_valid_node_name(n)) {
            return Err(GraphDefinitionError::InvalidName(bad.clone()));
        }
        for (node, node_parents) in &parents {
            let mut seen = BTreeSet::new();
            for parent in node_parents {
                if !parents.contains_key(parent) {
                    return Err(GraphDefinitionError::UnknownParent {
                        node: node.clone(),
                        parent: parent.clone(),
                    });
                }
                if !seen.insert(parent.as_str()) {
                    return Err(GraphDefinitionError::DuplicateParent {
                        node: node.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut order = Vec::with_capacity(parents.len());
        resolve_in_passes(&parents, |node, _| order.push(node.to_string()))
            .map_err(|stall| GraphDefinitionError::Cycle {
                unresolved: stall.unresolved,
            })?;

        Ok(Self { parents, order })
    }

    /// Build from `(node, parents)` pairs of string-likes.
    pub fn from_edges<I, N, P>(nodes: I) -> Result<Self, GraphDefinitionError>
    where
        I: IntoIterator<Item = (N, Vec<P>)>,
        N: Into<String>,
        P: Into<String>,
    {
        let spec = nodes
            .into_iter()
            .map(|(n, ps)| (n.into(), ps.into_iter().map(Into::into).collect()))
            .collect();
        Self::new(spec)
    }

    /// Skips validation so tests can hand malformed graphs to the simulator.
    #[cfg(test)]
    pub(crate) fn new_unchecked(parents: GraphSpec) -> Self {
        let order = parents.keys().cloned().collect();
        Self { parents, order }
    }

    /// Node names in lexicographic order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.parents.len()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.parents.contains_key(node)
    }

    /// Direct parents in declared order; `None` for unknown nodes.
    pub fn parents(&self, node: &str) -> Option<&[String]> {
        self.parents.get(node).map(Vec::as_slice)
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.parents
            .iter()
            .filter(|(_, ps)| ps.is_empty())
            .map(|(n, _)| n.as_str())
    }

    pub fn edge_count(&self) -> usize {
        self.parents.values().map(Vec::len).sum()
    }

    /// Order in which the pass resolver settled each node.
    pub fn resolution_order(&self) -> &[String] {
        &self.order
    }

    pub fn spec(&self) -> &GraphSpec {
        &self.parents
    }

    /// Stable hash of the canonical edge list, independent of declared parent order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (node, node_parents) in &self.parents {
            let mut sorted: Vec<&str> = node_parents.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            hasher.update(node.as_bytes());
            hasher.update(b"<-");
            hasher.update(sorted.join(",").as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl TryFrom<GraphSpec> for CausalGraph {
    type Error = GraphDefinitionError;

    fn try_from(spec: GraphSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl From<CausalGraph> for GraphSpec {
    fn from(graph: CausalGraph) -> Self {
        graph.parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(entries: &[(&str, &str)]) -> GraphSpec {
        entries
            .iter()
            .map(|(n, ps)| (n.to_string(), ps.split_whitespace().map(String::from).collect()))
            .collect()
    }

    #[test]
    fn chain_resolves_in_dependency_order() {
        // Names chosen so lexicographic order disagrees with dependency order.
        let graph = CausalGraph::new(spec(&[("a", "b"), ("b", "c"), ("c", "")])).unwrap();
        assert_eq!(graph.resolution_order(), ["c", "b", "a"]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let err = CausalGraph::new(spec(&[("Y", "X")])).unwrap_err();
        assert_eq!(
            err,
            GraphDefinitionError::UnknownParent {
                node: "Y".into(),
                parent: "X".into()
            }
        );
    }

    #[test]
    fn cycle_is_rejected_with_unresolved_nodes() {
        let err = CausalGraph::new(spec(&[
            ("A", "C"),
            ("B", "A"),
            ("C", "B"),
            ("R", ""),
        ]))
        .unwrap_err();
        match err {
            GraphDefinitionError::Cycle { unresolved } => {
                assert_eq!(unresolved, vec!["A", "B", "C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = CausalGraph::new(spec(&[("A", "A")])).unwrap_err();
        assert!(matches!(err, GraphDefinitionError::Cycle { .. }));
    }

    #[test]
    fn duplicate_parent_is_rejected() {
        let err = CausalGraph::new(spec(&[("A", ""), ("B", "A A")])).unwrap_err();
        assert!(matches!(err, GraphDefinitionError::DuplicateParent { .. }));
    }

    #[test]
    fn names_that_cannot_be_csv_fields_are_rejected() {
        for bad in ["", "a,b", "say \"hi\"", "two\nlines", "cr\r"] {
            let err = CausalGraph::new(spec(&[(bad, ""), ("ok", "")])).unwrap_err();
            assert_eq!(err, GraphDefinitionError::InvalidName(bad.to_string()));
        }
        assert!(CausalGraph::new(spec(&[("x_1", ""), ("Y score", "x_1")])).is_ok());
    }

    #[test]
    fn stall_is_reported_within_node_count_passes() {
        let raw = spec(&[("A", "B"), ("B", "A"), ("C", ""), ("D", "C")]);
        let stall = resolve_in_passes(&raw, |_, _| {}).unwrap_err();
        assert_eq!(stall.unresolved, vec!["A", "B"]);
        assert!(stall.passes <= raw.len());
    }

    #[test]
    fn fingerprint_ignores_declared_parent_order() {
        let a = CausalGraph::new(spec(&[("X", ""), ("Z", ""), ("Y", "X Z")])).unwrap();
        let b = CausalGraph::new(spec(&[("X", ""), ("Z", ""), ("Y", "Z X")])).unwrap();
        let c = CausalGraph::new(spec(&[("X", ""), ("Z", ""), ("Y", "X")])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn deserializes_from_parent_mapping() {
        let graph: CausalGraph = serde_json::from_str(r#"{"X": [], "Y": ["X"]}"#).unwrap();
        assert_eq!(graph.parents("Y").unwrap(), ["X"]);

        let bad = serde_json::from_str::<CausalGraph>(r#"{"Y": ["X"]}"#);
        assert!(bad.is_err());
    }
}
