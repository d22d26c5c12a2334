//! Scenario configuration, step loops and result I/O for the estimators.
//!
//! This module provides:
//! - `SimulationConfig` with a Kalman and a particle section, loadable from JSON, YAML or TOML
//! - Scenario builders that synthesize ground truth and noisy observations
//! - The step loops `run_kalman_filter` and `run_particle_filter`, which return a
//!   [`RunOutcome`] holding every completed step and the failure (if any) that stopped the run
//! - CSV import/export for the per-step records and ensemble snapshots
//! - The quadratic least-squares demo data
//! - Unit tests for validating functionality

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Vector4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::InputModel;
use crate::error::{EstimationError, Result};
use crate::kalman::{KalmanState, LinearKalmanFilter};
use crate::kinematics::{
    HarmonicControl, Integrator, SystemMatrices, generate_truth, sample_controls, step_interval,
    uniform_grid,
};
use crate::measurements::{ControlInput, MeasurementModel, PositionMeasurement};
use crate::noise::NoiseModel;
use crate::particle::{
    EnsembleSnapshot, ExponentialModel, ObservationHistory, ObservationModel, ParticleFilter,
    Theta,
};

/// Default seed value for reproducible simulations
fn default_seed() -> u64 {
    42
}

/// Kalman tracking scenario.
///
/// Ground truth is integrated from `initial_state` under the harmonic `control`
/// profile on `steps` evenly spaced points over `[0, duration]`. Position fixes are
/// the truth plus `N(0, noise_sigma) · noise_scale` per coordinate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanScenario {
    /// Number of time points, including the initial one
    pub steps: usize,
    /// Length of the simulated interval in seconds
    pub duration: f64,
    pub integrator: Integrator,
    /// Truth state `[p_x, p_y, v_x, v_y]` at t = 0, also the filter's prior mean
    pub initial_state: [f64; 4],
    /// Diagonal of the process noise covariance `Q`
    pub process_noise: [f64; 2],
    /// Diagonal of the measurement noise covariance `R`
    pub measurement_noise: [f64; 2],
    /// Diagonal of the prior covariance
    pub initial_covariance: [f64; 4],
    pub noise_sigma: f64,
    pub noise_scale: f64,
    pub seed: u64,
    /// Symmetrize the posterior covariance after every update
    pub enforce_symmetry: bool,
    /// Driving acceleration of the truth
    pub control: HarmonicControl,
}
impl Default for KalmanScenario {
    fn default() -> Self {
        KalmanScenario {
            steps: 100,
            duration: 8.0,
            integrator: Integrator::Midpoint,
            initial_state: [1.0, 1.0, 0.0, 0.0],
            process_noise: [1.0, 1.0],
            measurement_noise: [4.0, 4.0],
            initial_covariance: [0.1; 4],
            noise_sigma: 1.0,
            noise_scale: 2.0,
            seed: default_seed(),
            enforce_symmetry: false,
            control: HarmonicControl::default(),
        }
    }
}

/// Particle filter scenario over `f(x; θ) = θ0·exp(θ1·x + θ2) + θ3`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleScenario {
    /// Number of hypotheses `N`
    pub ensemble_size: usize,
    /// Number of observation points on `[0, x_max]`
    pub observations: usize,
    pub x_max: f64,
    /// Parameters that generate the observations
    pub true_theta: [f64; 4],
    /// Every initial parameter is drawn from `U[low, high)`
    pub sampling_range: [f64; 2],
    pub noise_sigma: f64,
    pub noise_scale: f64,
    /// Resample after every `resample_period`-th weight update
    pub resample_period: usize,
    /// Half-width of the uniform perturbation applied to repeated picks
    pub jitter: f64,
    /// Score hypotheses on the rayon thread pool
    pub parallel: bool,
    /// Hand a deep copy of the ensemble to the snapshot sink after every step
    pub record_snapshots: bool,
    pub seed: u64,
}
impl Default for ParticleScenario {
    fn default() -> Self {
        ParticleScenario {
            ensemble_size: 200,
            observations: 100,
            x_max: 2.0,
            true_theta: [1.0, 1.0, 0.0, 0.0],
            sampling_range: [0.2, 1.1],
            noise_sigma: 1.0,
            noise_scale: 0.1,
            resample_period: 5,
            jitter: 0.1,
            parallel: true,
            record_snapshots: false,
            seed: default_seed(),
        }
    }
}

/// Top level configuration for both scenarios.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub kalman: KalmanScenario,
    #[serde(default)]
    pub particle: ParticleScenario,
}
impl SimulationConfig {
    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// Results of a step loop.
///
/// `steps` holds every step that completed. If the loop was stopped by a fatal
/// condition, `failure` holds it and the completed steps are still valid.
#[derive(Debug)]
pub struct RunOutcome<T> {
    pub steps: Vec<T>,
    pub failure: Option<EstimationError>,
}
impl<T> RunOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
    /// Discard partial results: `Ok(steps)` only if every step completed.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.failure {
            None => Ok(self.steps),
            Some(e) => Err(e),
        }
    }
}

/// Posterior of one Kalman step.
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanEstimate {
    pub step: usize,
    pub time: f64,
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// Drive a Kalman filter over aligned control and measurement sequences.
///
/// Step `k` predicts with `controls[k]`, corrects with `measurements[k]` and is
/// labelled with `times[k]`.
///
/// # Returns
/// * `Err(InvalidInput)` before the first step if the sequences are empty or differ in length.
/// * `Ok(outcome)` otherwise; a failing step ends the loop and is stored in `outcome.failure`.
pub fn run_kalman_filter<C: InputModel, M: MeasurementModel>(
    filter: &mut LinearKalmanFilter,
    times: &[f64],
    controls: &[C],
    measurements: &[M],
) -> Result<RunOutcome<KalmanEstimate>> {
    if times.is_empty() {
        return Err(EstimationError::invalid("time sequence is empty"));
    }
    if controls.len() != times.len() || measurements.len() != times.len() {
        return Err(EstimationError::invalid(format!(
            "sequence lengths differ: {} times, {} controls, {} measurements",
            times.len(),
            controls.len(),
            measurements.len()
        )));
    }
    info!("running Kalman filter over {} steps", times.len());
    let mut steps = Vec::with_capacity(times.len());
    for (k, &time) in times.iter().enumerate() {
        match filter.step(&controls[k], &measurements[k]) {
            Ok(state) => steps.push(KalmanEstimate {
                step: k,
                time,
                mean: state.mean.clone(),
                covariance: state.covariance.clone(),
            }),
            Err(e) => {
                warn!("Kalman filter stopped at step {k}: {e}");
                return Ok(RunOutcome {
                    steps,
                    failure: Some(e),
                });
            }
        }
    }
    info!("Kalman filter finished {} steps", steps.len());
    Ok(RunOutcome {
        steps,
        failure: None,
    })
}

/// One row of the Kalman scenario output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanRecord {
    pub step: usize,
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_vx: f64,
    pub true_vy: f64,
    pub measured_x: f64,
    pub measured_y: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_vx: f64,
    pub estimate_vy: f64,
    pub variance_x: f64,
    pub variance_y: f64,
}
impl KalmanRecord {
    /// Writes records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_records(records, path)
    }
    /// Reads records written by [`KalmanRecord::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
}

/// Synthetic data of a Kalman scenario.
#[derive(Clone, Debug)]
pub struct KalmanData {
    pub times: Vec<f64>,
    pub truth: Vec<Vector4<f64>>,
    pub controls: Vec<ControlInput>,
    pub measurements: Vec<PositionMeasurement>,
}

fn validate_noise(sigma: f64, scale: f64) -> Result<()> {
    if !(sigma.is_finite() && sigma >= 0.0) {
        return Err(EstimationError::invalid(format!(
            "noise_sigma must be finite and non-negative, got {sigma}"
        )));
    }
    if !scale.is_finite() {
        return Err(EstimationError::invalid(format!(
            "noise_scale must be finite, got {scale}"
        )));
    }
    Ok(())
}

impl KalmanScenario {
    pub fn validate(&self) -> Result<()> {
        if self.steps < 2 {
            return Err(EstimationError::invalid(format!(
                "Kalman scenario needs at least two time points, got {}",
                self.steps
            )));
        }
        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return Err(EstimationError::invalid(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        let mut diagonals = self
            .process_noise
            .iter()
            .chain(&self.measurement_noise)
            .chain(&self.initial_covariance);
        if diagonals.any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(EstimationError::invalid(
                "noise and covariance diagonals must be finite and non-negative",
            ));
        }
        validate_noise(self.noise_sigma, self.noise_scale)
    }
    /// Uniform time grid over `[0, duration]`.
    pub fn times(&self) -> Vec<f64> {
        uniform_grid(0.0, self.duration, self.steps)
    }
    pub fn system(&self, dt: f64) -> Result<SystemMatrices> {
        let q = DMatrix::from_diagonal(&DVector::from_column_slice(&self.process_noise));
        let r = DMatrix::from_diagonal(&DVector::from_column_slice(&self.measurement_noise));
        SystemMatrices::constant_velocity(dt, q, r)
    }
    pub fn prior(&self) -> Result<KalmanState> {
        KalmanState::from_diagonal(
            self.initial_state.to_vec(),
            self.initial_covariance.to_vec(),
        )
    }
    /// Ground truth, sampled controls and noisy position fixes on the scenario grid.
    pub fn generate(&self) -> Result<KalmanData> {
        self.validate()?;
        let times = self.times();
        let initial = Vector4::from_column_slice(&self.initial_state);
        let truth = generate_truth(&times, initial, &self.control, self.integrator)?;
        let controls = sample_controls(&times, &self.control);
        let mut noise = NoiseModel::new(self.noise_sigma, self.noise_scale, self.seed)?;
        let measurements = noise.observe_positions(&truth);
        Ok(KalmanData {
            times,
            truth,
            controls,
            measurements,
        })
    }
}

/// Run the Kalman scenario end to end.
///
/// The filter starts from the prior at `t_0`; step `k` (for `k ≥ 1`) predicts with
/// the control sampled at `t_k` and corrects with the fix taken at `t_k`.
pub fn simulate_kalman(scenario: &KalmanScenario) -> Result<RunOutcome<KalmanRecord>> {
    let data = scenario.generate()?;
    let dt = step_interval(&data.times)?;
    let system = scenario.system(dt)?;
    let mut filter = LinearKalmanFilter::new(scenario.prior()?, system)?
        .with_symmetry_enforcement(scenario.enforce_symmetry);
    let outcome = run_kalman_filter(
        &mut filter,
        &data.times[1..],
        &data.controls[1..],
        &data.measurements[1..],
    )?;
    let records = outcome
        .steps
        .iter()
        .map(|estimate| {
            let k = estimate.step + 1;
            let truth = &data.truth[k];
            let z = &data.measurements[k];
            KalmanRecord {
                step: k,
                time: estimate.time,
                true_x: truth[0],
                true_y: truth[1],
                true_vx: truth[2],
                true_vy: truth[3],
                measured_x: z.x,
                measured_y: z.y,
                estimate_x: estimate.mean[0],
                estimate_y: estimate.mean[1],
                estimate_vx: estimate.mean[2],
                estimate_vy: estimate.mean[3],
                variance_x: estimate.covariance[(0, 0)],
                variance_y: estimate.covariance[(1, 1)],
            }
        })
        .collect();
    Ok(RunOutcome {
        steps: records,
        failure: outcome.failure,
    })
}

/// One row of the particle filter output: the best hypothesis after a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub step: usize,
    pub time: f64,
    pub observation: f64,
    pub theta0: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub theta3: f64,
    pub weight: f64,
    /// Mean squared residual of the best hypothesis over the observed prefix
    pub residual_mse: f64,
    pub effective_sample_size: f64,
    pub resampled: bool,
}
impl ParticleRecord {
    pub fn theta(&self) -> Theta {
        Theta::new(self.theta0, self.theta1, self.theta2, self.theta3)
    }
    /// Writes records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> Result<()> {
        write_records(records, path)
    }
    /// Reads records written by [`ParticleRecord::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        read_records(path)
    }
}

/// Drive a particle filter over an observation series.
///
/// Each step appends `(times[k], observations[k])` to the history, rescores every
/// hypothesis against the whole prefix, and resamples when `(k + 1)` is a multiple of
/// `resample_period`. If `snapshots` is given it receives a deep copy of the
/// ensemble at the end of every step.
///
/// # Returns
/// * `Err(InvalidInput)` before the first step for empty or mismatched series or a
///   zero resampling period.
/// * `Ok(outcome)` otherwise.
pub fn run_particle_filter<M: ObservationModel>(
    filter: &mut ParticleFilter<M>,
    times: &[f64],
    observations: &[f64],
    resample_period: usize,
    mut snapshots: Option<&mut dyn FnMut(EnsembleSnapshot)>,
) -> Result<RunOutcome<ParticleRecord>> {
    if times.is_empty() {
        return Err(EstimationError::invalid("observation series is empty"));
    }
    if times.len() != observations.len() {
        return Err(EstimationError::invalid(format!(
            "sequence lengths differ: {} times, {} observations",
            times.len(),
            observations.len()
        )));
    }
    if resample_period == 0 {
        return Err(EstimationError::invalid("resampling period must be positive"));
    }
    info!(
        "running particle filter with {} hypotheses over {} observations",
        filter.len(),
        times.len()
    );
    let mut history = ObservationHistory::with_capacity(times.len());
    let mut steps = Vec::with_capacity(times.len());
    for (k, (&time, &observation)) in times.iter().zip(observations).enumerate() {
        history.push(time, observation);
        if let Err(e) = filter.update_weights(&history) {
            warn!("particle filter stopped at step {k}: {e}");
            return Ok(RunOutcome {
                steps,
                failure: Some(e),
            });
        }
        let resampled = (k + 1) % resample_period == 0;
        if resampled {
            filter.resample();
        }
        if let Some(sink) = snapshots.as_deref_mut() {
            sink(filter.snapshot(k));
        }
        let best = *filter.best_hypothesis();
        debug!(
            "step {k}: best {}",
            ExponentialModel::describe(&best.theta)
        );
        steps.push(ParticleRecord {
            step: k,
            time,
            observation,
            theta0: best.theta[0],
            theta1: best.theta[1],
            theta2: best.theta[2],
            theta3: best.theta[3],
            weight: best.weight,
            residual_mse: filter.residual_mse(&history),
            effective_sample_size: filter.effective_sample_size(),
            resampled,
        });
    }
    info!("particle filter finished {} steps", steps.len());
    Ok(RunOutcome {
        steps,
        failure: None,
    })
}

impl ParticleScenario {
    pub fn validate(&self) -> Result<()> {
        if self.ensemble_size == 0 {
            return Err(EstimationError::invalid("ensemble size must be positive"));
        }
        if self.observations == 0 {
            return Err(EstimationError::invalid("observation count must be positive"));
        }
        if !(self.x_max > 0.0 && self.x_max.is_finite()) {
            return Err(EstimationError::invalid(format!(
                "x_max must be positive, got {}",
                self.x_max
            )));
        }
        let [low, high] = self.sampling_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(EstimationError::invalid(format!(
                "sampling range [{low}, {high}) is empty or not finite"
            )));
        }
        if self.resample_period == 0 {
            return Err(EstimationError::invalid("resampling period must be positive"));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(EstimationError::invalid(format!(
                "jitter must be finite and non-negative, got {}",
                self.jitter
            )));
        }
        validate_noise(self.noise_sigma, self.noise_scale)
    }
    pub fn true_theta(&self) -> Theta {
        Theta::from_column_slice(&self.true_theta)
    }
    /// Observation points on `[0, x_max]` and their noisy values `f(x; θ_true) + noise`.
    pub fn generate(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        self.validate()?;
        let xs = uniform_grid(0.0, self.x_max, self.observations);
        let theta = self.true_theta();
        let signal: Vec<f64> = xs
            .iter()
            .map(|&x| ExponentialModel.evaluate(x, &theta))
            .collect();
        // offset the seed so the noise stream differs from the ensemble draw
        let mut noise = NoiseModel::new(
            self.noise_sigma,
            self.noise_scale,
            self.seed.wrapping_add(1),
        )?;
        Ok((xs, noise.perturb_series(&signal)))
    }
    pub fn build_filter(&self) -> Result<ParticleFilter<ExponentialModel>> {
        self.validate()?;
        let [low, high] = self.sampling_range;
        Ok(
            ParticleFilter::new_uniform(ExponentialModel, self.ensemble_size, (low, high), self.seed)?
                .with_jitter(self.jitter)?
                .with_parallel(self.parallel),
        )
    }
}

/// Run the particle scenario end to end.
pub fn simulate_particle(
    scenario: &ParticleScenario,
    snapshots: Option<&mut dyn FnMut(EnsembleSnapshot)>,
) -> Result<RunOutcome<ParticleRecord>> {
    let (xs, zs) = scenario.generate()?;
    let mut filter = scenario.build_filter()?;
    let snapshots = if scenario.record_snapshots {
        snapshots
    } else {
        None
    };
    run_particle_filter(&mut filter, &xs, &zs, scenario.resample_period, snapshots)
}

/// One row of an ensemble snapshot file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub index: usize,
    pub theta0: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub theta3: f64,
    pub weight: f64,
}

/// File name used for the snapshot of a given step.
pub fn snapshot_file_name(step: usize) -> String {
    format!("ensemble_{step:04}.csv")
}

/// Write one snapshot as `ensemble_<step>.csv` inside `dir` and return the path.
pub fn write_snapshot<P: AsRef<Path>>(snapshot: &EnsembleSnapshot, dir: P) -> Result<PathBuf> {
    let path = dir.as_ref().join(snapshot_file_name(snapshot.step));
    let records: Vec<SnapshotRecord> = snapshot
        .thetas
        .iter()
        .zip(&snapshot.weights)
        .enumerate()
        .map(|(index, (theta, &weight))| SnapshotRecord {
            index,
            theta0: theta[0],
            theta1: theta[1],
            theta2: theta[2],
            theta3: theta[3],
            weight,
        })
        .collect();
    write_records(&records, &path)?;
    Ok(path)
}

/// Read a snapshot file back into an [`EnsembleSnapshot`].
pub fn read_snapshot<P: AsRef<Path>>(path: P, step: usize) -> Result<EnsembleSnapshot> {
    let records: Vec<SnapshotRecord> = read_records(path)?;
    Ok(EnsembleSnapshot {
        step,
        thetas: records
            .iter()
            .map(|r| Theta::new(r.theta0, r.theta1, r.theta2, r.theta3))
            .collect(),
        weights: records.iter().map(|r| r.weight).collect(),
    })
}

/// Noisy linear samples for the least-squares demo: `x_i = i / samples`,
/// `y_i = x_i + U[-0.5, 0.5)`.
pub fn linear_samples(samples: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let xs: Vec<f64> = (0..samples).map(|i| i as f64 / samples as f64).collect();
    let ys = xs
        .iter()
        .map(|&x| x + rng.random::<f64>() - 0.5)
        .collect();
    (xs, ys)
}

fn write_records<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}
