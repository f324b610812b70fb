#![forbid(unsafe_code)]

//! # simpson-harness
//!
//! Synthetic datasets that exhibit a multi-stage Simpson's paradox.
//!
//! A linear causal graph is simulated with edge weights chosen by simulated
//! annealing, so that the regression coefficient of a focal variable on an
//! outcome flips sign in a prescribed pattern as confounders are added to the
//! adjustment set one at a time.
//!
//! The pieces compose bottom-up: [`graph`] validates the structure, [`codec`]
//! maps weights to a flat vector, [`simulate`] draws a [`dataset::Dataset`],
//! [`trajectory`] fits the nested regressions, [`score`] compares the result to
//! a target, and [`anneal`] searches. [`pipeline`] wires them together.

pub mod anneal;
pub mod codec;
pub mod dataset;
pub mod graph;
pub mod pipeline;
pub mod regression;
pub mod score;
pub mod simulate;
pub mod trace;
pub mod trajectory;

pub use anneal::{anneal, AnnealConfig, AnnealOutcome, Evaluation};
pub use codec::{decode, encode, encode_schema, EdgeKey, ParameterSchema, WeightStructure};
pub use dataset::Dataset;
pub use graph::{CausalGraph, GraphDefinitionError, GraphSpec};
pub use pipeline::{run, ParadoxRun, PipelineError, Problem, RunReport, Scenario};
pub use regression::{ols, FitConfig, FitError};
pub use score::{ScoreBreakdown, ScoringConfig};
pub use simulate::{simulate, SimulationConfig, SimulationError};
pub use trace::{IterationTrace, JsonlTraceSink, TraceError, TraceSink, TraceWorker};
pub use trajectory::{extract_trajectory, TrajectorySpec};
