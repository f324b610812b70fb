//! Bijection between a flat parameter vector and per-edge weights.
//!
//! Canonical order: edge keys sorted by child name, then parent name. Both
//! directions walk the same `ParameterSchema`, so encode and decode can never
//! disagree on ordering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::CausalGraph;

/// One structural-equation coefficient: the weight of `parent` in `child`'s equation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub child: String,
    pub parent: String,
}

impl EdgeKey {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{}", self.child, self.parent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parameter vector has {actual} entries but the graph has {expected} edges")]
pub struct ParameterLengthError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("no weight for edge {0}")]
    MissingWeight(EdgeKey),
    #[error("weight given for {0}, which is not an edge of the graph")]
    UnexpectedWeight(EdgeKey),
}

/// Structural weights: child -> parent -> coefficient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightStructure(BTreeMap<String, BTreeMap<String, f64>>);

impl WeightStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, child: &str, parent: &str) -> Option<f64> {
        self.0.get(child).and_then(|ps| ps.get(parent)).copied()
    }

    pub fn set(&mut self, child: impl Into<String>, parent: impl Into<String>, weight: f64) {
        self.0
            .entry(child.into())
            .or_default()
            .insert(parent.into(), weight);
    }

    /// Builder-style `set`.
    pub fn with(mut self, child: &str, parent: &str, weight: f64) -> Self {
        self.set(child, parent, weight);
        self
    }

    /// Weights of one child's equation, keyed by parent.
    pub fn for_child(&self, child: &str) -> Option<&BTreeMap<String, f64>> {
        self.0.get(child)
    }

    /// All `(edge, weight)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (EdgeKey, f64)> + '_ {
        self.0.iter().flat_map(|(child, ps)| {
            ps.iter()
                .map(move |(parent, w)| (EdgeKey::new(child.as_str(), parent.as_str()), *w))
        })
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered edge keys of a graph; the single source of truth for vector layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSchema {
    edges: Vec<EdgeKey>,
}

impl ParameterSchema {
    pub fn from_graph(graph: &CausalGraph) -> Self {
        let mut edges: Vec<EdgeKey> = graph
            .spec()
            .iter()
            .flat_map(|(child, parents)| parents.iter().map(move |p| EdgeKey::new(child, p)))
            .collect();
        edges.sort();
        Self { edges }
    }

    pub fn edges(&self) -> &[EdgeKey] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn decode(&self, vector: &[f64]) -> Result<WeightStructure, ParameterLengthError> {
        if vector.len() != self.edges.len() {
            return Err(ParameterLengthError {
                expected: self.edges.len(),
                actual: vector.len(),
            });
        }
        let mut weights = WeightStructure::new();
        for (edge, &w) in self.edges.iter().zip(vector) {
            weights.set(edge.child.as_str(), edge.parent.as_str(), w);
        }
        Ok(weights)
    }

    /// Confirm `weights` covers exactly the schema's edges, without building
    /// a vector. Unexpected weights are reported before missing ones.
    pub fn check(&self, weights: &WeightStructure) -> Result<(), CodecError> {
        if let Some((extra, _)) = weights
            .iter()
            .find(|(key, _)| self.edges.binary_search(key).is_err())
        {
            return Err(CodecError::UnexpectedWeight(extra));
        }
        match self
            .edges
            .iter()
            .find(|edge| weights.get(&edge.child, &edge.parent).is_none())
        {
            Some(missing) => Err(CodecError::MissingWeight(missing.clone())),
            None => Ok(()),
        }
    }

    pub fn encode(&self, weights: &WeightStructure) -> Result<Vec<f64>, CodecError> {
        self.check(weights)?;
        self.edges
            .iter()
            .map(|edge| {
                weights
                    .get(&edge.child, &edge.parent)
                    .ok_or_else(|| CodecError::MissingWeight(edge.clone()))
            })
            .collect()
    }
}

/// Canonical edge-key order for `graph`.
pub fn encode_schema(graph: &CausalGraph) -> Vec<EdgeKey> {
    ParameterSchema::from_graph(graph).edges
}

pub fn decode(vector: &[f64], graph: &CausalGraph) -> Result<WeightStructure, ParameterLengthError> {
    ParameterSchema::from_graph(graph).decode(vector)
}

pub fn encode(weights: &WeightStructure, graph: &CausalGraph) -> Result<Vec<f64>, CodecError> {
    ParameterSchema::from_graph(graph).encode(weights)
}
