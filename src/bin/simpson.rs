#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use simpson_harness::pipeline::{self, Problem, Scenario};
use simpson_harness::{JsonlTraceSink, TraceSink, WeightStructure};

#[derive(Parser)]
#[command(
    name = "simpson",
    version,
    about = "Generate datasets exhibiting a multi-stage Simpson's paradox"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for edge weights that reproduce the target sign pattern
    Search {
        /// Scenario JSON; the built-in five-confounder scenario if omitted
        #[arg(long)]
        scenario: Option<PathBuf>,
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        noise: Option<f64>,
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Datasets to draw from the best weights while the pattern is missed
        #[arg(long)]
        regeneration_attempts: Option<usize>,
        /// CSV destination for the final dataset
        #[arg(long)]
        out: PathBuf,
        /// JSON run report
        #[arg(long)]
        report: Option<PathBuf>,
        /// JSONL per-iteration trace
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Exit with an error if the final dataset misses the sign pattern
        #[arg(long)]
        require_pattern: bool,
    },
    /// Simulate a dataset from fixed weights and print its trajectory
    Simulate {
        #[arg(long)]
        scenario: Option<PathBuf>,
        /// Weights JSON: {"child": {"parent": weight}}
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        noise: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write the built-in scenario as JSON
    Scenario {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            scenario,
            rows,
            noise,
            iterations,
            seed,
            regeneration_attempts,
            out,
            report,
            trace,
            require_pattern,
        } => {
            let mut scenario = load_scenario(scenario.as_ref())?;
            apply_overrides(&mut scenario, rows, noise, seed);
            if let Some(iterations) = iterations {
                scenario.anneal.iterations = iterations;
            }
            if let Some(attempts) = regeneration_attempts {
                scenario.regeneration_attempts = attempts;
            }

            let (trace_sink, trace_worker) = if let Some(path) = trace {
                let (sink, worker) = JsonlTraceSink::new(path)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn TraceSink);

            let result = pipeline::run(scenario, trace_ref);

            drop(trace_sink);
            if let Some(worker) = trace_worker {
                let lines = worker.join()?;
                info!(lines, "wrote trace");
            }
            let run = result.map_err(|e| -> Box<dyn std::error::Error> {
                format!("[{}] {e}", e.code()).into()
            })?;

            run.dataset.write_csv_path(&out)?;
            info!(path = %out.display(), rows = run.dataset.rows(), "wrote dataset");
            if let Some(path) = report {
                write_json(&path, &run.report)?;
            }

            let assessment = &run.report.final_assessment;
            println!(
                "best score {:.4}; final score {:.4}; trajectory {:?}; pattern {}",
                run.report.search.best_score,
                assessment.score.total,
                assessment.trajectory,
                if assessment.signs_match {
                    "matched"
                } else {
                    "missed"
                }
            );

            if require_pattern && !assessment.signs_match {
                return Err(format!(
                    "final trajectory misses the target sign pattern ({} mismatches)",
                    assessment.score.sign_mismatches
                )
                .into());
            }
        }
        Commands::Simulate {
            scenario,
            weights,
            rows,
            noise,
            seed,
            out,
        } => {
            let mut scenario = load_scenario(scenario.as_ref())?;
            apply_overrides(&mut scenario, rows, noise, seed);
            let weights: WeightStructure = read_json(&weights)?;

            let problem = Problem::new(scenario)?;
            problem.schema().check(&weights)?;
            let mut rng = StdRng::seed_from_u64(problem.seed());
            let (dataset, assessment) = problem.assess(&weights, &mut rng)?;

            dataset.write_csv_path(&out)?;
            info!(path = %out.display(), rows = dataset.rows(), "wrote dataset");
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        Commands::Scenario { out } => {
            let scenario = Scenario::default();
            match out {
                Some(path) => write_json(&path, &scenario)?,
                None => println!("{}", serde_json::to_string_pretty(&scenario)?),
            }
        }
    }

    Ok(())
}

fn load_scenario(path: Option<&PathBuf>) -> Result<Scenario, Box<dyn std::error::Error>> {
    match path {
        Some(path) => read_json(path),
        None => Ok(Scenario::default()),
    }
}

fn apply_overrides(
    scenario: &mut Scenario,
    rows: Option<usize>,
    noise: Option<f64>,
    seed: Option<u64>,
) {
    if let Some(rows) = rows {
        scenario.simulation.rows = rows;
    }
    if let Some(noise) = noise {
        scenario.simulation.noise_scale = noise;
    }
    if let Some(seed) = seed {
        scenario.seed = seed;
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
