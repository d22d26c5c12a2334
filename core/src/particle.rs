//! Particle filter over the parameters of a nonlinear observation model.
//!
//! Each [`Hypothesis`] carries a candidate parameter vector `θ` and a weight. The
//! filter scores every hypothesis against the whole observation prefix seen so far,
//!
//! $$
//! \delta_i = \sum_t \left(Z_t - f(t; \theta_i)\right)^2, \qquad w_i = 1 / \delta_i
//! $$
//!
//! normalizes the weights, and periodically replaces the ensemble with a
//! systematically resampled one. Indices drawn more than once during a resampling
//! pass are not copied verbatim: the repeat gets a jittered `θ` and the uniform
//! weight `1/N`, which keeps the ensemble from collapsing onto identical copies.
//!
//! Scoring is independent per hypothesis and runs on the rayon thread pool when the
//! filter is in parallel mode; normalization runs after every score is written.

use std::collections::HashSet;
use std::fmt::{self, Display};

use log::{debug, warn};
use nalgebra::Vector4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Parameter vector `[θ0, θ1, θ2, θ3]` of the observation model.
pub type Theta = Vector4<f64>;

/// Residuals below this are scored as an exact fit, `1 / MIN_DELTA`.
pub const MIN_DELTA: f64 = 1e-12;
/// Default half-width of the uniform jitter applied to repeated picks.
pub const DEFAULT_JITTER: f64 = 0.1;

/// Parametric observation function `f(x; θ)`.
pub trait ObservationModel: Sync {
    fn evaluate(&self, x: f64, theta: &Theta) -> f64;
}

/// `f(x; θ) = θ0 · exp(θ1·x + θ2) + θ3`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExponentialModel;
impl ObservationModel for ExponentialModel {
    fn evaluate(&self, x: f64, theta: &Theta) -> f64 {
        theta[0] * (theta[1] * x + theta[2]).exp() + theta[3]
    }
}
impl ExponentialModel {
    /// Human readable curve, e.g. `1.00*e^(1.00x+0.00)+0.00`.
    pub fn describe(theta: &Theta) -> String {
        format!(
            "{:.2}*e^({:.2}x{:+.2})+{:.2}",
            theta[0], theta[1], theta[2], theta[3]
        )
    }
}

/// One candidate parameter vector and its weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hypothesis {
    pub theta: Theta,
    pub weight: f64,
}
impl Hypothesis {
    pub fn new(theta: Theta, weight: f64) -> Self {
        Hypothesis { theta, weight }
    }
}
impl Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypothesis")
            .field("theta", &self.theta.as_slice())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Append-only record of observation points `(t, Z_t)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationHistory {
    times: Vec<f64>,
    values: Vec<f64>,
}
impl ObservationHistory {
    pub fn new() -> Self {
        ObservationHistory::default()
    }
    pub fn with_capacity(capacity: usize) -> Self {
        ObservationHistory {
            times: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }
    /// Build a history from two parallel series.
    pub fn from_series(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(EstimationError::invalid(format!(
                "observation history needs matching series, got {} times and {} values",
                times.len(),
                values.len()
            )));
        }
        Ok(ObservationHistory { times, values })
    }
    pub fn push(&mut self, t: f64, value: f64) {
        self.times.push(t);
        self.values.push(value);
    }
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
    pub fn times(&self) -> &[f64] {
        &self.times
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }
}

/// Sum of squared residuals of one hypothesis over the whole history.
pub fn sum_squared_residual<M: ObservationModel + ?Sized>(
    model: &M,
    theta: &Theta,
    history: &ObservationHistory,
) -> f64 {
    history
        .iter()
        .map(|(t, z)| {
            let r = z - model.evaluate(t, theta);
            r * r
        })
        .sum()
}

/// Unnormalized weight for a residual sum: `1 / max(δ, MIN_DELTA)`, 0 if `δ` is not finite.
#[inline]
pub fn score(delta: f64) -> f64 {
    if delta.is_finite() {
        1.0 / delta.max(MIN_DELTA)
    } else {
        0.0
    }
}

/// Systematic resampling with mutation on repeated picks.
///
/// Pointer `index` starts uniformly in `[0, N)` and an offset `betta` grows by a
/// uniform draw in `[0, 2·max w)` per output slot. For each slot, `betta` walks the
/// weights (wrapping) until it no longer exceeds the weight at `index`. A first pick
/// is copied verbatim; a repeat gets each parameter shifted by `U[-jitter, jitter]`
/// and weight `1/N`.
///
/// Non-finite or negative weights count as zero. If no weight is positive the draw
/// runs over uniform weights. A non-finite `jitter` falls back to [`DEFAULT_JITTER`].
pub fn systematic_resample<R: Rng>(
    hypotheses: &[Hypothesis],
    jitter: f64,
    rng: &mut R,
) -> Vec<Hypothesis> {
    let n = hypotheses.len();
    if n == 0 {
        return Vec::new();
    }
    let uniform = 1.0 / n as f64;
    let mut weights: Vec<f64> = hypotheses
        .iter()
        .map(|h| {
            if h.weight.is_finite() && h.weight > 0.0 {
                h.weight
            } else {
                0.0
            }
        })
        .collect();
    let mut max_weight = weights.iter().cloned().fold(0.0, f64::max);
    if max_weight <= 0.0 {
        warn!("resampling {n} hypotheses without positive weight, drawing uniformly");
        weights = vec![uniform; n];
        max_weight = uniform;
    }
    let span = 2.0 * max_weight;
    let jitter = if jitter.is_finite() {
        jitter.abs()
    } else {
        warn!("jitter {jitter} is not finite, using {DEFAULT_JITTER}");
        DEFAULT_JITTER
    };

    let mut resampled = Vec::with_capacity(n);
    let mut seen = HashSet::with_capacity(n);
    let mut index = rng.random_range(0..n);
    let mut betta = 0.0;
    for _ in 0..n {
        betta += rng.random::<f64>() * span;
        while betta > weights[index] {
            betta -= weights[index];
            index = (index + 1) % n;
        }
        let source = &hypotheses[index];
        if seen.insert(index) {
            resampled.push(*source);
        } else {
            let theta = source
                .theta
                .map(|p| p + rng.random_range(-jitter..=jitter));
            resampled.push(Hypothesis::new(theta, uniform));
        }
    }
    resampled
}

/// Deep copy of an ensemble at one step.
#[derive(Clone, Debug, PartialEq)]
pub struct EnsembleSnapshot {
    pub step: usize,
    pub thetas: Vec<Theta>,
    pub weights: Vec<f64>,
}
impl EnsembleSnapshot {
    pub fn len(&self) -> usize {
        self.thetas.len()
    }
    pub fn is_empty(&self) -> bool {
        self.thetas.is_empty()
    }
}

/// Ensemble of parameter hypotheses with its own seeded random source.
#[derive(Clone, Debug)]
pub struct ParticleFilter<M: ObservationModel = ExponentialModel> {
    hypotheses: Vec<Hypothesis>,
    model: M,
    jitter: f64,
    parallel: bool,
    rng: StdRng,
}
impl<M: ObservationModel> Display for ParticleFilter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .hypotheses
            .iter()
            .map(|h| h.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.hypotheses.iter().map(|h| h.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_hypotheses", &self.hypotheses.len())
            .field("effective_hypotheses", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("best_theta", &self.best_hypothesis().theta.as_slice())
            .finish()
    }
}
impl<M: ObservationModel> ParticleFilter<M> {
    /// Filter over an explicit ensemble.
    pub fn new(hypotheses: Vec<Hypothesis>, model: M, seed: u64) -> Result<Self> {
        if hypotheses.is_empty() {
            return Err(EstimationError::invalid("ensemble must hold at least one hypothesis"));
        }
        Ok(ParticleFilter {
            hypotheses,
            model,
            jitter: DEFAULT_JITTER,
            parallel: true,
            rng: StdRng::seed_from_u64(seed),
        })
    }
    /// `size` hypotheses with every parameter drawn from `U[low, high)` and weight `1/size`.
    pub fn new_uniform(model: M, size: usize, range: (f64, f64), seed: u64) -> Result<Self> {
        let (low, high) = range;
        if size == 0 {
            return Err(EstimationError::invalid("ensemble size must be positive"));
        }
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(EstimationError::invalid(format!(
                "sampling range [{low}, {high}) is empty or not finite"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = 1.0 / size as f64;
        let hypotheses = (0..size)
            .map(|_| {
                let theta = Theta::from_fn(|_, _| rng.random_range(low..high));
                Hypothesis::new(theta, weight)
            })
            .collect();
        Ok(ParticleFilter {
            hypotheses,
            model,
            jitter: DEFAULT_JITTER,
            parallel: true,
            rng,
        })
    }
    /// Half-width of the perturbation applied to repeated picks when resampling.
    ///
    /// # Errors
    /// `InvalidInput` if `jitter` is negative or not finite.
    pub fn with_jitter(mut self, jitter: f64) -> Result<Self> {
        if !(jitter.is_finite() && jitter >= 0.0) {
            return Err(EstimationError::invalid(format!(
                "jitter must be finite and non-negative, got {jitter}"
            )));
        }
        self.jitter = jitter;
        Ok(self)
    }
    /// Score hypotheses on the rayon pool (`true`) or on the calling thread.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }
    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }
    pub fn model(&self) -> &M {
        &self.model
    }
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
    pub fn weights(&self) -> Vec<f64> {
        self.hypotheses.iter().map(|h| h.weight).collect()
    }
    /// Overwrite the weights, e.g. to replay a known distribution.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.hypotheses.len() {
            return Err(EstimationError::invalid(format!(
                "expected {} weights, got {}",
                self.hypotheses.len(),
                weights.len()
            )));
        }
        for (h, &w) in self.hypotheses.iter_mut().zip(weights) {
            h.weight = w;
        }
        Ok(())
    }
    /// Rescore every hypothesis against the full history and normalize.
    pub fn update_weights(&mut self, history: &ObservationHistory) -> Result<()> {
        if history.is_empty() {
            return Err(EstimationError::invalid(
                "cannot score hypotheses against an empty observation history",
            ));
        }
        let model = &self.model;
        if self.parallel {
            self.hypotheses.par_iter_mut().for_each(|h| {
                h.weight = score(sum_squared_residual(model, &h.theta, history));
            });
        } else {
            self.hypotheses.iter_mut().for_each(|h| {
                h.weight = score(sum_squared_residual(model, &h.theta, history));
            });
        }
        self.normalize_weights();
        Ok(())
    }
    /// Divide every weight by the total; fall back to uniform weights if the total
    /// is zero or not finite.
    pub fn normalize_weights(&mut self) {
        let sum: f64 = self.hypotheses.iter().map(|h| h.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for h in &mut self.hypotheses {
                h.weight /= sum;
            }
        } else {
            warn!("degenerate weight sum {sum}, resetting to uniform weights");
            let uniform = 1.0 / self.hypotheses.len() as f64;
            for h in &mut self.hypotheses {
                h.weight = uniform;
            }
        }
    }
    /// Replace the ensemble by a systematically resampled one of the same size.
    pub fn resample(&mut self) {
        debug!(
            "resampling {} hypotheses, effective size {:.2}",
            self.hypotheses.len(),
            self.effective_sample_size()
        );
        self.hypotheses = systematic_resample(&self.hypotheses, self.jitter, &mut self.rng);
    }
    /// Index of the highest weight; ties go to the lowest index.
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, h) in self.hypotheses.iter().enumerate().skip(1) {
            if h.weight > self.hypotheses[best].weight {
                best = i;
            }
        }
        best
    }
    pub fn best_hypothesis(&self) -> &Hypothesis {
        &self.hypotheses[self.best_index()]
    }
    /// Point prediction of the best hypothesis.
    pub fn predict(&self, x: f64) -> f64 {
        self.model.evaluate(x, &self.best_hypothesis().theta)
    }
    /// Mean squared residual of the best hypothesis over a history.
    pub fn residual_mse(&self, history: &ObservationHistory) -> f64 {
        if history.is_empty() {
            return 0.0;
        }
        sum_squared_residual(&self.model, &self.best_hypothesis().theta, history)
            / history.len() as f64
    }
    /// `1 / Σ w²`
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self.hypotheses.iter().map(|h| h.weight * h.weight).sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }
    /// Deep copy of the current parameters and weights.
    pub fn snapshot(&self, step: usize) -> EnsembleSnapshot {
        EnsembleSnapshot {
            step,
            thetas: self.hypotheses.iter().map(|h| h.theta).collect(),
            weights: self.weights(),
        }
    }
}
