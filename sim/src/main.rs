//! TRACKEST: A command line runner for the Kalman tracking and particle filter scenarios.
//!
//! This program can operate in four modes:
//!
//! - `kf`: Integrates a planar ground truth under a harmonic acceleration, corrupts the positions
//!   with Gaussian noise and tracks them with a linear Kalman filter.
//!
//! - `pf`: Estimates the parameters of `a*e^(bx+c)+d` from a growing series of noisy samples with
//!   a particle filter, printing the best hypothesis after every step.
//!
//! - `lsq`: Fits a quadratic by least squares to noisy samples of `y = x`.
//!
//! - `config`: Writes a template configuration file.
//!
//! Scenario parameters come from the built-in defaults or from a configuration file
//! (TOML/JSON/YAML) given with `--config`; command line flags override individual values.

mod common;
mod snapshots;

use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger, validate_output_dir};
use log::{error, info, warn};
use snapshots::SnapshotWriter;
use std::error::Error;
use std::path::{Path, PathBuf};
use trackest::linalg::{evaluate_polynomial, fit_quadratic};
use trackest::particle::{EnsembleSnapshot, ExponentialModel};
use trackest::sim::{
    KalmanRecord, ParticleRecord, RunOutcome, SimulationConfig, linear_samples, simulate_kalman,
    simulate_particle,
};

const LONG_ABOUT: &str =
    "TRACKEST: A command line runner for the Kalman tracking and particle filter scenarios.

This program can operate in four modes:

- kf: Integrates a planar ground truth under a harmonic acceleration, corrupts the positions
  with Gaussian noise and tracks them with a linear Kalman filter.

- pf: Estimates the parameters of a*e^(bx+c)+d from a growing series of noisy samples with a
  particle filter, printing the best hypothesis after every step.

- lsq: Fits a quadratic by least squares to noisy samples of y = x.

- config: Writes a template configuration file.

Scenario parameters come from the built-in defaults or from a configuration file (TOML/JSON/YAML)
given with --config; command line flags override individual values.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A runner for Kalman and particle filter estimation scenarios.", long_about = LONG_ABOUT)]
struct Cli {
    /// Load scenario parameters from a configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone, Debug)]
enum Command {
    #[command(
        name = "kf",
        about = "Run the Kalman tracking scenario",
        long_about = "Integrate the planar ground truth, synthesize noisy position fixes and track them with a linear Kalman filter. Reports the position error of the raw fixes and of the filter."
    )]
    Kalman(KalmanArgs),
    #[command(
        name = "pf",
        about = "Run the particle filter scenario",
        long_about = "Estimate the parameters of a*e^(bx+c)+d from noisy samples with a particle filter. Weights are updated after every sample and the ensemble is resampled every resample-period steps."
    )]
    Particle(ParticleArgs),
    #[command(name = "lsq", about = "Run the quadratic least-squares demo")]
    LeastSquares(LeastSquaresArgs),
    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Kalman scenario arguments
#[derive(Args, Clone, Debug)]
struct KalmanArgs {
    /// Output CSV file path for the per-step records
    #[arg(short, long, value_parser)]
    output: Option<PathBuf>,

    /// RNG seed for the measurement noise
    #[arg(long)]
    seed: Option<u64>,

    /// Number of time points
    #[arg(long)]
    steps: Option<usize>,

    /// Symmetrize the posterior covariance after every update
    #[arg(long)]
    enforce_symmetry: bool,
}

/// Particle scenario arguments
#[derive(Args, Clone, Debug)]
struct ParticleArgs {
    /// Output CSV file path for the per-step best hypothesis
    #[arg(short, long, value_parser)]
    output: Option<PathBuf>,

    /// Directory for per-step ensemble snapshots (written in the background)
    #[arg(long, value_parser)]
    snapshots: Option<PathBuf>,

    /// RNG seed for the ensemble and the observation noise
    #[arg(long)]
    seed: Option<u64>,

    /// Number of hypotheses
    #[arg(long)]
    ensemble_size: Option<usize>,

    /// Resample after every N-th weight update
    #[arg(long)]
    resample_period: Option<usize>,

    /// Score hypotheses on the calling thread only
    #[arg(long)]
    sequential: bool,
}

/// Least-squares demo arguments
#[derive(Args, Clone, Debug)]
struct LeastSquaresArgs {
    /// Number of samples
    #[arg(long, default_value_t = 100)]
    samples: usize,

    /// RNG seed for the sample noise
    #[arg(long, default_value_t = 1664)]
    seed: u64,
}

/// Arguments for create-config command
#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file path for the config file
    /// File extension determines format: .json, .yaml/.yml, or .toml (recommended)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig, Box<dyn Error>> {
    match path {
        Some(p) => {
            info!("Loading configuration from {}", p.display());
            Ok(SimulationConfig::from_file(p)?)
        }
        None => Ok(SimulationConfig::default()),
    }
}

/// Log the failure of a partially completed run and turn it into an error.
fn finish_outcome<T>(outcome: &mut RunOutcome<T>, what: &str) -> Result<(), Box<dyn Error>> {
    match outcome.failure.take() {
        None => Ok(()),
        Some(e) => {
            error!(
                "{} stopped after {} completed steps: {}",
                what,
                outcome.steps.len(),
                e
            );
            Err(e.into())
        }
    }
}

fn rmse(errors: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = errors.fold((0.0, 0usize), |(s, n), e| (s + e * e, n + 1));
    if n == 0 { 0.0 } else { (sum / n as f64).sqrt() }
}

fn run_kalman(config: &SimulationConfig, args: &KalmanArgs) -> Result<(), Box<dyn Error>> {
    let mut scenario = config.kalman.clone();
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if let Some(steps) = args.steps {
        scenario.steps = steps;
    }
    scenario.enforce_symmetry |= args.enforce_symmetry;
    info!(
        "Running Kalman scenario: {} points over {} s, {:?} integrator",
        scenario.steps, scenario.duration, scenario.integrator
    );

    let mut outcome = simulate_kalman(&scenario)?;
    let records = &outcome.steps;
    let raw = rmse(
        records
            .iter()
            .map(|r| (r.measured_x - r.true_x).hypot(r.measured_y - r.true_y)),
    );
    let filtered = rmse(
        records
            .iter()
            .map(|r| (r.estimate_x - r.true_x).hypot(r.estimate_y - r.true_y)),
    );
    info!("Position RMSE: measurements {:.4}, filter {:.4}", raw, filtered);
    if let Some(last) = records.last() {
        println!(
            "final estimate at t = {:.3}: ({:.4}, {:.4}), truth ({:.4}, {:.4})",
            last.time, last.estimate_x, last.estimate_y, last.true_x, last.true_y
        );
    }
    if let Some(output) = &args.output {
        write_kalman_output(records, output)?;
    }
    finish_outcome(&mut outcome, "Kalman filter")
}

fn write_kalman_output(records: &[KalmanRecord], output: &Path) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(output)?;
    KalmanRecord::to_csv(records, output)?;
    info!("Wrote {} records to {}", records.len(), output.display());
    Ok(())
}

fn run_particle(config: &SimulationConfig, args: &ParticleArgs) -> Result<(), Box<dyn Error>> {
    let mut scenario = config.particle.clone();
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if let Some(size) = args.ensemble_size {
        scenario.ensemble_size = size;
    }
    if let Some(period) = args.resample_period {
        scenario.resample_period = period;
    }
    if args.sequential {
        scenario.parallel = false;
    }
    scenario.record_snapshots = args.snapshots.is_some();
    info!(
        "Running particle scenario: {} hypotheses, {} observations, resampling every {} steps",
        scenario.ensemble_size, scenario.observations, scenario.resample_period
    );

    let writer = match &args.snapshots {
        Some(dir) => {
            validate_output_dir(dir)?;
            Some(SnapshotWriter::spawn(dir.clone()))
        }
        None => None,
    };
    let mut outcome = {
        let mut warned = false;
        let mut forward = |snapshot: EnsembleSnapshot| {
            if let Some(w) = &writer
                && !w.send(snapshot)
                && !warned
            {
                warn!("Snapshot writer stopped, further snapshots are dropped");
                warned = true;
            }
        };
        let sink: &mut dyn FnMut(EnsembleSnapshot) = &mut forward;
        simulate_particle(&scenario, Some(sink))?
    };
    if let Some(w) = writer {
        let written = w.finish()?;
        info!("Wrote {} ensemble snapshots", written);
    }

    for record in &outcome.steps {
        println!("{}", ExponentialModel::describe(&record.theta()));
    }
    if let Some(last) = outcome.steps.last() {
        info!(
            "Best hypothesis after {} observations: {} (residual MSE {:.6})",
            last.step + 1,
            ExponentialModel::describe(&last.theta()),
            last.residual_mse
        );
    }
    if let Some(output) = &args.output {
        ensure_parent_dir(output)?;
        ParticleRecord::to_csv(&outcome.steps, output)?;
        info!("Wrote {} records to {}", outcome.steps.len(), output.display());
    }
    finish_outcome(&mut outcome, "Particle filter")
}

fn run_least_squares(args: &LeastSquaresArgs) -> Result<(), Box<dyn Error>> {
    let (xs, ys) = linear_samples(args.samples, args.seed);
    let coefficients = fit_quadratic(&xs, &ys)?;
    println!(
        "kfs: [{:.4}, {:.4}, {:.4}]",
        coefficients[0], coefficients[1], coefficients[2]
    );
    let residual = rmse(
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| y - evaluate_polynomial(&coefficients, x)),
    );
    info!("Least-squares fit over {} samples, RMS residual {:.4}", xs.len(), residual);
    Ok(())
}

fn create_config_file(config: &SimulationConfig, args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(&args.output)?;
    config.to_file(&args.output)?;
    info!("Wrote configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let config = load_config(cli.config.as_ref())?;
    let result = match &cli.command {
        Command::Kalman(args) => run_kalman(&config, args),
        Command::Particle(args) => run_particle(&config, args),
        Command::LeastSquares(args) => run_least_squares(args),
        Command::CreateConfig(args) => create_config_file(&config, args),
    };
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}
