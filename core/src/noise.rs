//! Additive Gaussian noise for synthesizing observations.
//!
//! `noisy = signal + N(0, σ) · scale`, sampled independently per coordinate and
//! per step. Both `σ` and the scale factor are explicit so that the Kalman and
//! particle scenarios can use different magnitudes without hidden constants.
use nalgebra::{DVector, Vector4};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::error::{EstimationError, Result};
use crate::measurements::PositionMeasurement;

/// Seeded additive Gaussian noise source.
#[derive(Clone, Debug)]
pub struct NoiseModel {
    sigma: f64,
    scale: f64,
    distribution: Normal<f64>,
    rng: StdRng,
}
impl NoiseModel {
    /// # Arguments
    /// * `sigma` - standard deviation of the base normal distribution
    /// * `scale` - multiplier applied to every draw
    /// * `seed` - RNG seed, runs with equal seeds draw equal noise
    pub fn new(sigma: f64, scale: f64, seed: u64) -> Result<Self> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(EstimationError::invalid(format!(
                "noise standard deviation must be finite and non-negative, got {sigma}"
            )));
        }
        let distribution = Normal::new(0.0, sigma).map_err(|e| {
            EstimationError::invalid(format!("noise standard deviation {sigma} is invalid: {e}"))
        })?;
        if !scale.is_finite() {
            return Err(EstimationError::invalid(format!(
                "noise scale factor must be finite, got {scale}"
            )));
        }
        Ok(NoiseModel {
            sigma,
            scale,
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
    pub fn scale(&self) -> f64 {
        self.scale
    }
    /// One scaled draw `N(0, σ) · scale`.
    pub fn sample(&mut self) -> f64 {
        self.distribution.sample(&mut self.rng) * self.scale
    }
    pub fn perturb(&mut self, value: f64) -> f64 {
        value + self.sample()
    }
    pub fn perturb_series(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&v| self.perturb(v)).collect()
    }
    pub fn perturb_vector(&mut self, signal: &DVector<f64>) -> DVector<f64> {
        signal.map(|v| self.perturb(v))
    }
    /// Noisy position fixes from a sequence of `[p_x, p_y, v_x, v_y]` states.
    pub fn observe_positions(&mut self, states: &[Vector4<f64>]) -> Vec<PositionMeasurement> {
        states
            .iter()
            .map(|s| PositionMeasurement::new(self.perturb(s[0]), self.perturb(s[1])))
            .collect()
    }
}
