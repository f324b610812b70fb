//! Paradox search pipeline: scenario → weights → data → trajectory → score.
//!
//! A [`Scenario`] is the serializable description of one search. [`Problem`]
//! is its validated form and owns the objective used by the annealer:
//! decode a parameter vector into edge weights, simulate a fresh dataset,
//! extract the coefficient trajectory, and score it against the target.
//! [`run`] drives the whole search from a single seed.
//!
//! Usage:
//! ```bash
//! simpson search --rows 500 --iterations 3000 --seed 7 --out data.csv --report report.json
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::anneal::{anneal, AnnealConfig, AnnealConfigError, AnnealOutcome, Evaluation};
use crate::codec::{CodecError, ParameterLengthError, ParameterSchema, WeightStructure};
use crate::dataset::{ColumnSummary, Dataset};
use crate::graph::{CausalGraph, GraphDefinitionError, GraphSpec};
use crate::regression::{FitConfig, FitError};
use crate::score::{signs_match, ScoreBreakdown, ScoreError, ScoringConfig};
use crate::simulate::{simulate, SimulationConfig, SimulationError};
use crate::trace::{TraceError, TraceSink};
use crate::trajectory::{extract_trajectory, TrajectorySpec, TrajectorySpecError};

// =============================================================================
// Types
// =============================================================================

/// Serializable search description. Every field has a default, so `{}` is the
/// built-in five-confounder scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Node name → parent names.
    pub graph: GraphSpec,
    pub outcome: String,
    pub focal: String,
    /// Adjustment order; the trajectory uses every prefix of this list.
    pub covariates: Vec<String>,
    /// Explicit covariate sets. Overrides `covariates` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covariate_sets: Option<Vec<Vec<String>>>,
    /// Desired focal coefficient per covariate set.
    pub target: Vec<f64>,
    pub simulation: SimulationConfig,
    pub fit: FitConfig,
    pub scoring: ScoringConfig,
    pub anneal: AnnealConfig,
    pub seed: u64,
    /// Datasets drawn from the best weights before giving up on the sign
    /// pattern. The first matching draw is kept, else the lowest-scoring one.
    pub regeneration_attempts: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        let confounders: Vec<String> = (1..=5).map(|i| format!("Z{i}")).collect();

        let mut graph = GraphSpec::new();
        for z in &confounders {
            graph.insert(z.clone(), Vec::new());
        }
        graph.insert("X".to_string(), confounders.clone());
        let mut y_parents = vec!["X".to_string()];
        y_parents.extend(confounders.iter().cloned());
        graph.insert("Y".to_string(), y_parents);

        Self {
            graph,
            outcome: "Y".to_string(),
            focal: "X".to_string(),
            covariates: confounders,
            covariate_sets: None,
            target: vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0],
            simulation: SimulationConfig::default(),
            fit: FitConfig::default(),
            scoring: ScoringConfig::default(),
            anneal: AnnealConfig::default(),
            seed: 0,
            regeneration_attempts: 1,
        }
    }
}

impl Scenario {
    pub fn trajectory_spec(&self) -> TrajectorySpec {
        match &self.covariate_sets {
            Some(sets) => TrajectorySpec::new(&self.outcome, &self.focal, sets.clone()),
            None => {
                TrajectorySpec::nested(&self.outcome, &self.focal, self.covariates.as_slice())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphDefinitionError),
    #[error(transparent)]
    Trajectory(#[from] TrajectorySpecError),
    #[error("target has {target} entries but the trajectory has {covariate_sets}")]
    TargetLength { target: usize, covariate_sets: usize },
    #[error("target entries must be finite")]
    NonFiniteTarget,
    #[error("regeneration_attempts must be at least 1")]
    NoRegenerationAttempts,
    #[error(transparent)]
    ParameterLength(#[from] ParameterLengthError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Anneal(#[from] AnnealConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

impl PipelineError {
    /// Stable short code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Graph(_) => "graph_definition",
            Self::Trajectory(_) => "trajectory_spec",
            Self::TargetLength { .. } | Self::NonFiniteTarget => "target",
            Self::NoRegenerationAttempts => "regeneration",
            Self::ParameterLength(_) => "parameter_length",
            Self::Codec(_) => "codec",
            Self::Simulation(_) => "simulation",
            Self::Fit(_) => "fit",
            Self::Score(_) => "score",
            Self::Anneal(_) => "anneal_config",
            Self::Trace(_) => "trace",
        }
    }
}

/// Trajectory and score of one simulated dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub trajectory: Vec<f64>,
    pub score: ScoreBreakdown,
    pub signs_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeWeight {
    pub child: String,
    pub parent: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub graph_fingerprint: String,
    pub seed: u64,
    pub rows: usize,
    pub noise_scale: f64,
    pub target: Vec<f64>,
    pub covariate_sets: Vec<Vec<String>>,
    /// Best weights, in canonical edge order.
    pub weights: Vec<EdgeWeight>,
    pub search: AnnealOutcome,
    /// Assessment of the dataset regenerated from the best weights.
    pub final_assessment: Assessment,
    /// Datasets drawn before `final_assessment` was settled.
    pub regeneration_draws: usize,
    pub columns: Vec<ColumnSummary>,
}

/// Report plus the dataset it describes.
#[derive(Debug, Clone)]
pub struct ParadoxRun {
    pub report: RunReport,
    pub weights: WeightStructure,
    pub dataset: Dataset,
}

// =============================================================================
// Problem
// =============================================================================

/// Validated scenario, ready to evaluate candidates.
#[derive(Debug, Clone)]
pub struct Problem {
    graph: CausalGraph,
    schema: ParameterSchema,
    trajectory: TrajectorySpec,
    target: Vec<f64>,
    simulation: SimulationConfig,
    fit: FitConfig,
    scoring: ScoringConfig,
    anneal: AnnealConfig,
    seed: u64,
    regeneration_attempts: usize,
}

impl Problem {
    pub fn new(scenario: Scenario) -> Result<Self, PipelineError> {
        let trajectory = scenario.trajectory_spec();
        let graph = CausalGraph::new(scenario.graph)?;
        trajectory.validate(&graph)?;
        if scenario.target.len() != trajectory.len() {
            return Err(PipelineError::TargetLength {
                target: scenario.target.len(),
                covariate_sets: trajectory.len(),
            });
        }
        if scenario.target.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::NonFiniteTarget);
        }
        scenario.simulation.validate()?;
        scenario.anneal.validate()?;
        if scenario.regeneration_attempts == 0 {
            return Err(PipelineError::NoRegenerationAttempts);
        }

        let schema = ParameterSchema::from_graph(&graph);
        Ok(Self {
            graph,
            schema,
            trajectory,
            target: scenario.target,
            simulation: scenario.simulation,
            fit: scenario.fit,
            scoring: scenario.scoring,
            anneal: scenario.anneal,
            seed: scenario.seed,
            regeneration_attempts: scenario.regeneration_attempts,
        })
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    pub fn trajectory_spec(&self) -> &TrajectorySpec {
        &self.trajectory
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Simulate `weights` once and score the resulting trajectory.
    pub fn assess<R: Rng + ?Sized>(
        &self,
        weights: &WeightStructure,
        rng: &mut R,
    ) -> Result<(Dataset, Assessment), PipelineError> {
        let data = simulate(&self.graph, weights, &self.simulation, rng)?;
        let trajectory = extract_trajectory(&data, &self.trajectory, &self.fit)?;
        let score = self.scoring.score(&trajectory, &self.target)?;
        let signs_match = signs_match(&trajectory, &self.target);
        Ok((
            data,
            Assessment {
                trajectory,
                score,
                signs_match,
            },
        ))
    }

    /// Annealing objective. A regression failure marks the candidate
    /// degenerate; every other error aborts the search.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        vector: &[f64],
        rng: &mut R,
    ) -> Result<Evaluation, PipelineError> {
        let weights = self.schema.decode(vector)?;
        match self.assess(&weights, rng) {
            Ok((_, assessment)) => Ok(Evaluation::Scored(assessment.score.total)),
            Err(PipelineError::Fit(err)) => {
                debug!(error = %err, "candidate produced an unfittable dataset");
                Ok(Evaluation::Degenerate)
            }
            Err(err) => Err(err),
        }
    }

    /// Redraw datasets from `weights` until one shows the sign pattern or the
    /// attempt budget runs out. Returns the kept draw and the number made.
    fn regenerate(
        &self,
        weights: &WeightStructure,
        rng: &mut StdRng,
    ) -> Result<(Dataset, Assessment, usize), PipelineError> {
        let (mut dataset, mut kept) = self.assess(weights, rng)?;
        let mut draws = 1;
        while !kept.signs_match && draws < self.regeneration_attempts {
            let (data, assessment) = self.assess(weights, rng)?;
            draws += 1;
            if assessment.signs_match || assessment.score.total < kept.score.total {
                dataset = data;
                kept = assessment;
            }
        }
        Ok((dataset, kept, draws))
    }

    /// Run the search, then regenerate the dataset from the best weights.
    pub fn solve(&self, trace: Option<&dyn TraceSink>) -> Result<ParadoxRun, PipelineError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let fingerprint = self.graph.fingerprint();

        info!(
            graph = %fingerprint,
            nodes = self.graph.node_count(),
            edges = self.schema.len(),
            covariate_sets = self.trajectory.len(),
            iterations = self.anneal.iterations,
            seed = self.seed,
            "starting paradox search"
        );

        let search: AnnealOutcome = anneal(
            self.schema.len(),
            &self.anneal,
            &mut rng,
            trace,
            |vector: &[f64], rng: &mut StdRng| self.evaluate(vector, rng),
        )?;

        info!(
            best_score = search.best_score,
            iterations = search.iterations_run,
            accepted = search.accepted,
            degenerate = search.degenerate_evaluations,
            stopped_early = search.stopped_early,
            "search finished"
        );

        let weights = self.schema.decode(&search.best)?;
        let (dataset, final_assessment, draws) = self.regenerate(&weights, &mut rng)?;

        if final_assessment.signs_match {
            info!(
                score = final_assessment.score.total,
                draws,
                "final dataset reproduces the target sign pattern"
            );
        } else {
            // The search scored a different draw; sampling noise alone can
            // flip a near-zero coefficient.
            warn!(
                search_best_score = search.best_score,
                final_score = final_assessment.score.total,
                mismatches = final_assessment.score.sign_mismatches,
                draws,
                trajectory = ?final_assessment.trajectory,
                "dataset regenerated from the best weights misses the target sign pattern"
            );
        }

        let report = RunReport {
            graph_fingerprint: fingerprint,
            seed: self.seed,
            rows: self.simulation.rows,
            noise_scale: self.simulation.noise_scale,
            target: self.target.clone(),
            covariate_sets: self.trajectory.covariate_sets.clone(),
            weights: weights
                .iter()
                .map(|(edge, weight)| EdgeWeight {
                    child: edge.child,
                    parent: edge.parent,
                    weight,
                })
                .collect(),
            search,
            final_assessment,
            regeneration_draws: draws,
            columns: dataset.summaries(),
        };

        Ok(ParadoxRun {
            report,
            weights,
            dataset,
        })
    }
}

/// Validate `scenario` and run its search.
pub fn run(scenario: Scenario, trace: Option<&dyn TraceSink>) -> Result<ParadoxRun, PipelineError> {
    Problem::new(scenario)?.solve(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_scenario() -> Scenario {
        let mut graph = GraphSpec::new();
        graph.insert("A".into(), vec![]);
        graph.insert("B".into(), vec!["A".into()]);
        graph.insert("C".into(), vec!["B".into()]);
        graph.insert("D".into(), vec!["A".into()]);
        graph.insert("E".into(), vec!["D".into()]);
        Scenario {
            graph,
            outcome: "C".into(),
            focal: "A".into(),
            covariates: vec![],
            covariate_sets: None,
            target: vec![6.0],
            simulation: SimulationConfig::new(200, 0.0),
            anneal: AnnealConfig {
                iterations: 20,
                ..AnnealConfig::default()
            },
            ..Scenario::default()
        }
    }

    #[test]
    fn default_scenario_is_valid() {
        let problem = Problem::new(Scenario::default()).unwrap();
        assert_eq!(problem.graph().node_count(), 7);
        assert_eq!(problem.schema().len(), 11);
        assert_eq!(problem.trajectory_spec().len(), 6);
        assert_eq!(problem.target().len(), 6);
    }

    #[test]
    fn scenario_deserializes_from_partial_json() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"seed": 4, "simulation": {"rows": 50}}"#).unwrap();
        assert_eq!(scenario.seed, 4);
        assert_eq!(scenario.simulation.rows, 50);
        assert_eq!(scenario.simulation.noise_scale, 0.1);
        assert_eq!(scenario.graph, Scenario::default().graph);
    }

    #[test]
    fn target_length_must_match_covariate_sets() {
        let scenario = Scenario {
            target: vec![1.0, -1.0],
            ..Scenario::default()
        };
        let err = Problem::new(scenario).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TargetLength {
                target: 2,
                covariate_sets: 6
            }
        ));
        assert_eq!(err.code(), "target");
    }

    #[test]
    fn cyclic_scenario_fails_before_any_sampling() {
        let mut graph = GraphSpec::new();
        graph.insert("X".into(), vec!["Y".into()]);
        graph.insert("Y".into(), vec!["X".into()]);
        let scenario = Scenario {
            graph,
            covariates: vec![],
            target: vec![1.0],
            ..Scenario::default()
        };
        let err = Problem::new(scenario).unwrap_err();
        assert_eq!(err.code(), "graph_definition");
    }

    #[test]
    fn chain_coefficient_is_product_of_weights() {
        let problem = Problem::new(chain_scenario()).unwrap();
        let weights = WeightStructure::new()
            .with("B", "A", 2.0)
            .with("C", "B", 3.0)
            .with("D", "A", 1.0)
            .with("E", "D", 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let (data, assessment) = problem.assess(&weights, &mut rng).unwrap();

        let a = data.column("A").unwrap();
        let c = data.column("C").unwrap();
        for (a, c) in a.iter().zip(c) {
            assert!((c - 6.0 * a).abs() < 1e-9);
        }
        assert!((assessment.trajectory[0] - 6.0).abs() < 1e-9);
        assert!(assessment.signs_match);
        assert!(assessment.score.total < 1e-9);
    }

    #[test]
    fn singular_candidates_are_degenerate_not_fatal() {
        // X is an exact copy of Z1 when its noise is zero.
        let mut graph = GraphSpec::new();
        graph.insert("Z1".into(), vec![]);
        graph.insert("X".into(), vec!["Z1".into()]);
        graph.insert("Y".into(), vec!["X".into(), "Z1".into()]);
        let problem = Problem::new(Scenario {
            graph,
            covariates: vec!["Z1".into()],
            target: vec![1.0, -1.0],
            simulation: SimulationConfig::new(100, 0.0),
            ..Scenario::default()
        })
        .unwrap();

        let mut rng = StdRng::seed_from_u64(2);
        let eval = problem.evaluate(&[1.0, 1.0, 1.0], &mut rng).unwrap();
        assert_eq!(eval, Evaluation::Degenerate);
    }

    #[test]
    fn repeated_covariate_is_rejected_before_searching() {
        let scenario = Scenario {
            covariate_sets: Some(vec![vec![], vec!["Z1".into(), "Z1".into()]]),
            target: vec![1.0, -1.0],
            ..Scenario::default()
        };
        let err = Problem::new(scenario).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Trajectory(TrajectorySpecError::DuplicateCovariate { index: 1, .. })
        ));
        assert_eq!(err.code(), "trajectory_spec");
    }

    #[test]
    fn wrong_vector_length_aborts_evaluation() {
        let problem = Problem::new(Scenario::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = problem.evaluate(&[0.0; 3], &mut rng).unwrap_err();
        assert_eq!(err.code(), "parameter_length");
    }

    #[test]
    fn same_seed_same_run() {
        let scenario = Scenario {
            seed: 11,
            simulation: SimulationConfig::new(80, 0.1),
            anneal: AnnealConfig {
                iterations: 30,
                ..AnnealConfig::default()
            },
            ..Scenario::default()
        };
        let a = run(scenario.clone(), None).unwrap();
        let b = run(scenario, None).unwrap();
        assert_eq!(a.report, b.report);
        assert_eq!(a.dataset, b.dataset);
    }

    #[test]
    fn zero_regeneration_attempts_is_rejected() {
        let err = Problem::new(Scenario {
            regeneration_attempts: 0,
            ..chain_scenario()
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::NoRegenerationAttempts));
        assert_eq!(err.code(), "regeneration");
    }

    #[test]
    fn regeneration_stops_at_the_first_matching_draw() {
        // Noise-free, so every draw of a positive-product chain matches.
        let scenario = Scenario {
            regeneration_attempts: 5,
            anneal: AnnealConfig {
                iterations: 300,
                ..AnnealConfig::default()
            },
            ..chain_scenario()
        };
        let out = run(scenario, None).unwrap();
        assert!(out.report.search.best_score < ScoringConfig::default().sign_penalty);
        assert!(out.report.final_assessment.signs_match);
        assert_eq!(out.report.regeneration_draws, 1);
    }

    #[test]
    fn unreachable_pattern_spends_every_draw_and_keeps_the_best() {
        // A fitted coefficient is never exactly zero.
        let scenario = Scenario {
            target: vec![0.0],
            regeneration_attempts: 4,
            ..chain_scenario()
        };
        let problem = Problem::new(scenario).unwrap();
        let out = problem.solve(None).unwrap();
        assert_eq!(out.report.regeneration_draws, 4);
        assert!(!out.report.final_assessment.signs_match);

        // Replay the same draws and confirm the kept one scores lowest.
        let mut rng = StdRng::seed_from_u64(problem.seed());
        anneal(
            problem.schema().len(),
            &AnnealConfig {
                iterations: 20,
                ..AnnealConfig::default()
            },
            &mut rng,
            None,
            |v: &[f64], rng: &mut StdRng| problem.evaluate(v, rng),
        )
        .unwrap();
        let best = (0..4)
            .map(|_| problem.assess(&out.weights, &mut rng).unwrap().1.score.total)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(out.report.final_assessment.score.total, best);
    }

    #[test]
    fn report_lists_weights_in_canonical_order() {
        let out = run(chain_scenario(), None).unwrap();
        let edges: Vec<(&str, &str)> = out
            .report
            .weights
            .iter()
            .map(|w| (w.child.as_str(), w.parent.as_str()))
            .collect();
        assert_eq!(edges, vec![("B", "A"), ("C", "B"), ("D", "A"), ("E", "D")]);
        assert_eq!(out.report.columns.len(), 5);
        assert_eq!(out.dataset.rows(), 200);
    }
}
