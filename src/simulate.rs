//! Structural simulator for weighted linear causal graphs.
//!
//! Roots draw `Uniform[0, 1)`. Every other node is the weighted sum of its
//! parents plus independent Gaussian noise. Nodes resolve in repeated passes;
//! a pass that resolves nothing aborts with `UnresolvedDependency`.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codec::{EdgeKey, WeightStructure};
use crate::dataset::Dataset;
use crate::graph::{resolve_in_passes, CausalGraph};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated units (table rows). Must be positive.
    pub rows: usize,
    /// Standard deviation of the additive noise on dependent nodes.
    pub noise_scale: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rows: 500,
            noise_scale: 0.1,
        }
    }
}

impl SimulationConfig {
    pub fn new(rows: usize, noise_scale: f64) -> Self {
        Self { rows, noise_scale }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.rows == 0 {
            return Err(SimulationError::InvalidConfig(
                "row count must be positive".to_string(),
            ));
        }
        if !self.noise_scale.is_finite() || self.noise_scale < 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "noise scale must be a finite non-negative number, got {}",
                self.noise_scale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),
    #[error("no weight for edge {0}")]
    MissingWeight(EdgeKey),
    #[error("no progress resolving nodes: {}", unresolved.join(", "))]
    UnresolvedDependency { unresolved: Vec<String> },
}

/// Generate a full dataset from scratch.
///
/// Consumes randomness from `rng` in a fixed order (resolution order, then row
/// order), so identical RNG state and weights reproduce the dataset exactly.
pub fn simulate<R: Rng + ?Sized>(
    graph: &CausalGraph,
    weights: &WeightStructure,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Dataset, SimulationError> {
    config.validate()?;
    for (child, parents) in graph.spec() {
        for parent in parents {
            if weights.get(child, parent).is_none() {
                return Err(SimulationError::MissingWeight(EdgeKey::new(
                    child.as_str(),
                    parent.as_str(),
                )));
            }
        }
    }

    let rows = config.rows;
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    resolve_in_passes(graph.spec(), |node, parents| {
        let column = if parents.is_empty() {
            (0..rows).map(|_| rng.gen::<f64>()).collect()
        } else {
            let inputs: Vec<(&[f64], f64)> = parents
                .iter()
                .map(|p| {
                    // Both lookups were checked above and by the resolver.
                    let col = columns.get(p).map(Vec::as_slice).unwrap_or(&[]);
                    (col, weights.get(node, p).unwrap_or(0.0))
                })
                .collect();
            let mut column = Vec::with_capacity(rows);
            for row in 0..rows {
                let mut value = 0.0;
                for (col, w) in &inputs {
                    value += w * col[row];
                }
                value += sample_normal(rng, 0.0, config.noise_scale);
                column.push(value);
            }
            column
        };
        columns.insert(node.to_string(), column);
    })
    .map_err(|stall| {
        debug!(passes = stall.passes, "simulation stalled");
        SimulationError::UnresolvedDependency {
            unresolved: stall.unresolved,
        }
    })?;

    Ok(Dataset::from_columns(rows, columns))
}

/// Box-Muller draw; `std <= 0` returns `mean` without touching the RNG.
pub(crate) fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std
}
