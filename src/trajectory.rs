//! Coefficient trajectory: the focal coefficient across nested covariate sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Dataset;
use crate::graph::CausalGraph;
use crate::regression::{ols, FitConfig, FitError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySpec {
    /// Response column.
    pub outcome: String,
    /// Variable whose coefficient is tracked.
    pub focal: String,
    /// Covariates added alongside the focal variable, one regression per entry.
    pub covariate_sets: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrajectorySpecError {
    #[error("'{0}' is not a node of the graph")]
    UnknownVariable(String),
    #[error("outcome and focal variable are both '{0}'")]
    FocalIsOutcome(String),
    #[error("covariate set {index} contains '{name}', which is the focal variable or outcome")]
    CovariateOverlap { index: usize, name: String },
    #[error("covariate set {index} lists '{name}' more than once")]
    DuplicateCovariate { index: usize, name: String },
    #[error("no covariate sets given")]
    NoCovariateSets,
}

impl TrajectorySpec {
    pub fn new(
        outcome: impl Into<String>,
        focal: impl Into<String>,
        covariate_sets: Vec<Vec<String>>,
    ) -> Self {
        Self {
            outcome: outcome.into(),
            focal: focal.into(),
            covariate_sets,
        }
    }

    /// Spec whose covariate sets are the nested prefixes of `covariates`.
    pub fn nested<S: AsRef<str>>(
        outcome: impl Into<String>,
        focal: impl Into<String>,
        covariates: &[S],
    ) -> Self {
        Self::new(outcome, focal, nested_covariate_sets(covariates))
    }

    pub fn len(&self) -> usize {
        self.covariate_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariate_sets.is_empty()
    }

    pub fn validate(&self, graph: &CausalGraph) -> Result<(), TrajectorySpecError> {
        if self.covariate_sets.is_empty() {
            return Err(TrajectorySpecError::NoCovariateSets);
        }
        for name in [&self.outcome, &self.focal] {
            if !graph.contains(name) {
                return Err(TrajectorySpecError::UnknownVariable(name.clone()));
            }
        }
        if self.outcome == self.focal {
            return Err(TrajectorySpecError::FocalIsOutcome(self.focal.clone()));
        }
        for (index, set) in self.covariate_sets.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for name in set {
                if !graph.contains(name) {
                    return Err(TrajectorySpecError::UnknownVariable(name.clone()));
                }
                if *name == self.focal || *name == self.outcome {
                    return Err(TrajectorySpecError::CovariateOverlap {
                        index,
                        name: name.clone(),
                    });
                }
                if !seen.insert(name.as_str()) {
                    return Err(TrajectorySpecError::DuplicateCovariate {
                        index,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// `[]`, `[c0]`, `[c0, c1]`, ... up to the full list.
pub fn nested_covariate_sets<S: AsRef<str>>(covariates: &[S]) -> Vec<Vec<String>> {
    (0..=covariates.len())
        .map(|k| {
            covariates[..k]
                .iter()
                .map(|c| c.as_ref().to_string())
                .collect()
        })
        .collect()
}

/// Focal coefficient of `outcome ~ focal + set` for each covariate set, in order.
pub fn extract_trajectory(
    data: &Dataset,
    spec: &TrajectorySpec,
    fit: &FitConfig,
) -> Result<Vec<f64>, FitError> {
    let lookup = |name: &str| {
        data.column(name)
            .ok_or_else(|| FitError::UnknownColumn(name.to_string()))
    };
    let response = lookup(&spec.outcome)?;
    let focal = lookup(&spec.focal)?;

    let mut trajectory = Vec::with_capacity(spec.covariate_sets.len());
    for set in &spec.covariate_sets {
        let mut predictors: Vec<&[f64]> = Vec::with_capacity(set.len() + 1);
        predictors.push(focal);
        for name in set {
            predictors.push(lookup(name)?);
        }
        let result = ols(response, &predictors, fit)?;
        trajectory.push(result.coefficients[0]);
    }
    Ok(trajectory)
}
