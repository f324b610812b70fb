//! Simulated annealing over a flat parameter vector.
//!
//! Derivative-free and strictly sequential: each step perturbs the current
//! vector, scores it, and applies the Metropolis rule under a geometrically
//! cooling temperature. One RNG drives initialization, proposals, acceptance and
//! the objective itself, so a seed reproduces the whole search.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::simulate::sample_normal;
use crate::trace::{IterationTrace, TraceError, TraceSink};

/// Smallest temperature used in the acceptance ratio.
const MIN_TEMPERATURE_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealConfig {
    /// Proposals evaluated after the initial vector.
    pub iterations: usize,
    pub initial_temperature: f64,
    /// Per-iteration multiplier on the temperature, in (0, 1].
    pub cooling_rate: f64,
    pub min_temperature: f64,
    /// Standard deviation of the Gaussian perturbation on every coordinate.
    pub step_size: f64,
    /// Initial components are drawn uniformly from `[-init_range, init_range]`.
    pub init_range: f64,
    /// Stop as soon as the best score is at or below this value.
    pub target_score: Option<f64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            iterations: 3_000,
            initial_temperature: 2.0,
            cooling_rate: 0.997,
            min_temperature: 1e-3,
            step_size: 0.25,
            init_range: 0.5,
            target_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid anneal config: {0}")]
pub struct AnnealConfigError(pub String);

impl AnnealConfig {
    pub fn validate(&self) -> Result<(), AnnealConfigError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(AnnealConfigError(format!("{name} must be positive, got {v}")))
            }
        };
        positive("initial_temperature", self.initial_temperature)?;
        positive("step_size", self.step_size)?;
        if !(self.cooling_rate > 0.0 && self.cooling_rate <= 1.0) {
            return Err(AnnealConfigError(format!(
                "cooling_rate must be in (0, 1], got {}",
                self.cooling_rate
            )));
        }
        if !self.min_temperature.is_finite() || self.min_temperature < 0.0 {
            return Err(AnnealConfigError(format!(
                "min_temperature must be non-negative, got {}",
                self.min_temperature
            )));
        }
        if !self.init_range.is_finite() || self.init_range < 0.0 {
            return Err(AnnealConfigError(format!(
                "init_range must be non-negative, got {}",
                self.init_range
            )));
        }
        Ok(())
    }
}

/// Result of scoring one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Scored(f64),
    /// The candidate produced data the objective could not score (e.g. a
    /// singular regression). Ranked worse than any finite score.
    Degenerate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnealOutcome {
    pub best: Vec<f64>,
    pub best_score: f64,
    /// Last accepted vector.
    pub current: Vec<f64>,
    pub current_score: f64,
    pub iterations_run: usize,
    pub accepted: usize,
    pub improvements: usize,
    pub degenerate_evaluations: usize,
    pub stopped_early: bool,
}

/// Minimize `objective` over vectors of length `dim`.
///
/// Objective errors abort the search and are returned as-is; degenerate
/// candidates are absorbed and counted.
pub fn anneal<R, F, E>(
    dim: usize,
    cfg: &AnnealConfig,
    rng: &mut R,
    trace: Option<&dyn TraceSink>,
    mut objective: F,
) -> Result<AnnealOutcome, E>
where
    R: Rng + ?Sized,
    F: FnMut(&[f64], &mut R) -> Result<Evaluation, E>,
    E: From<AnnealConfigError> + From<TraceError>,
{
    cfg.validate()?;

    let mut degenerate_evaluations = 0usize;

    let r = cfg.init_range;
    let mut current: Vec<f64> = (0..dim).map(|_| rng.gen_range(-r..=r)).collect();
    let first = objective(&current, &mut *rng)?;
    let mut current_score = to_score(first, &mut degenerate_evaluations);

    let mut best = current.clone();
    let mut best_score = current_score;
    let mut temperature = cfg.initial_temperature;
    let mut accepted = 0usize;
    let mut improvements = 0usize;
    let mut iterations_run = 0usize;
    let mut stopped_early = false;

    for iteration in 0..cfg.iterations {
        if cfg.target_score.is_some_and(|target| best_score <= target) {
            stopped_early = true;
            break;
        }
        iterations_run += 1;

        let candidate: Vec<f64> = current
            .iter()
            .map(|v| v + sample_normal(&mut *rng, 0.0, cfg.step_size))
            .collect();
        let eval = objective(&candidate, &mut *rng)?;
        let candidate_score = to_score(eval, &mut degenerate_evaluations);
        if !candidate_score.is_finite() {
            debug!(iteration, "degenerate candidate");
        }

        let accept = if !candidate_score.is_finite() {
            // Only wander while the current point is degenerate too.
            !current_score.is_finite()
        } else if candidate_score <= current_score {
            true
        } else {
            let t = temperature.max(MIN_TEMPERATURE_FLOOR);
            rng.gen::<f64>() < (-(candidate_score - current_score) / t).exp()
        };

        let mut improved_best = false;
        if accept {
            current = candidate;
            current_score = candidate_score;
            accepted += 1;
            if current_score < best_score {
                best.clone_from(&current);
                best_score = current_score;
                improvements += 1;
                improved_best = true;
                info!(iteration, best_score, "new best");
            }
        }

        if let Some(sink) = trace {
            sink.record(IterationTrace {
                iteration,
                temperature,
                candidate_score: candidate_score.is_finite().then_some(candidate_score),
                current_score,
                best_score,
                accepted: accept,
                improved_best,
            })?;
        }

        temperature = (temperature * cfg.cooling_rate).max(cfg.min_temperature);
    }

    Ok(AnnealOutcome {
        best,
        best_score,
        current,
        current_score,
        iterations_run,
        accepted,
        improvements,
        degenerate_evaluations,
        stopped_early,
    })
}

fn to_score(eval: Evaluation, degenerate: &mut usize) -> f64 {
    match eval {
        Evaluation::Scored(s) if !s.is_nan() => s,
        _ => {
            *degenerate += 1;
            f64::INFINITY
        }
    }
}
