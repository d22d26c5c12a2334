//! Recursive state estimation toolbox for kinematic tracking and curve fitting
//!
//! This crate provides two Bayesian estimators and the scaffolding needed to exercise them against synthetic
//! data. The first is a linear Kalman filter tracking a planar point mass from noisy position fixes under a known
//! acceleration command. The second is a particle filter that estimates the four parameters of a nonlinear
//! (exponential) observation model from a growing series of noisy samples. Both are designed to be driven by a
//! strictly sequential per-step loop: step `t+1` always depends on the posterior of step `t`.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for the filters.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for noise and simulation (primarily for particle filter methods).
//! - [`rayon`](https://crates.io/crates/rayon): Provides the fork/join thread pool used to score particle hypotheses.
//!
//! All other functionality is built on top of these crates or is auxiliary functionality (e.g. configuration
//! and CSV I/O). Variables are named according to the quantity they represent rather than the textbook symbol
//! wherever it reads naturally; the filter recursions keep the usual `F`, `G`, `Γ`, `Q`, `H`, `R` notation in
//! their documentation.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [error]: Contains the crate error type and result alias.
//! - [kalman]: Contains the linear Kalman filter, both as pure step functions and as an owning filter.
//! - [kinematics]: Contains the planar kinematic model, driving functions, and the ground truth generator.
//! - [linalg]: Contains linear algebra utilities (checked inverse, symmetry checks, least-squares fit).
//! - [measurements]: Contains measurement and control input models consumed by the filters.
//! - [noise]: Contains the seeded additive Gaussian noise model used to synthesize observations.
//! - [particle]: Contains the particle filter over observation model parameters.
//! - [sim]: Contains scenario configuration, the step loops, and result I/O.
//!
//! ## Kinematic state
//!
//! The Kalman filter tracks the four-state planar vector
//!
//! $$
//! x = [p_x, p_y, v_x, v_y]
//! $$
//!
//! driven by a planar acceleration $u = [a_x, a_y]$ and observed through its position components only.
//!
//! ## Observation model
//!
//! The particle filter estimates $\theta = [\theta_0, \theta_1, \theta_2, \theta_3]$ of
//!
//! $$
//! f(x; \theta) = \theta_0 e^{\theta_1 x + \theta_2} + \theta_3
//! $$
//!
//! by weighting each hypothesis with the inverse of its cumulative squared residual.
pub mod error;
pub mod kalman;
pub mod kinematics;
pub mod linalg;
pub mod measurements;
pub mod noise;
pub mod particle;
pub mod sim;

use nalgebra::{DMatrix, DVector};

pub use crate::error::{EstimationError, Result};
use crate::measurements::MeasurementModel;

/// Generic Bayesian estimator interface
///
/// A filter first propagates its belief with a control input and then
/// corrects it with a measurement. Both calls can fail; a failed call leaves
/// the previous belief in place.
pub trait StateEstimator {
    fn predict<C: InputModel + ?Sized>(&mut self, control_input: &C) -> Result<()>;
    fn update<M: MeasurementModel + ?Sized>(&mut self, measurement: &M) -> Result<()>;
    fn get_estimate(&self) -> DVector<f64>;
    fn get_certainty(&self) -> DMatrix<f64>;
}
/// Generic input model trait for all types of control inputs
///
/// Control inputs are really just measurements that are used to
/// propagate or predict the state estimate rather than to constrain
/// error. For the kinematic tracker this is the planar acceleration
/// command.
///
/// See [measurements::MeasurementModel] for the complementary trait
/// used for measurement updates.
pub trait InputModel {
    /// Get the dimension of the input vector
    fn get_dimension(&self) -> usize;
    /// Get the input in a vector format
    fn get_vector(&self) -> DVector<f64>;
}
