//! Linear Kalman filter for the planar kinematic tracker
//!
//! This module contains the discrete-time linear Kalman filter used to track the
//! `[p_x, p_y, v_x, v_y]` state from noisy position fixes. The recursion is split
//! into pure [`predict`] and [`update`] functions (composed by [`kalman_step`]) and
//! an owning [`LinearKalmanFilter`] that keeps the state between steps.
//!
//! One cycle, in this order:
//!
//! $$
//! \bar{x} = F x + G u, \qquad \bar{P} = F P F^T + \Gamma Q \Gamma^T
//! $$
//!
//! $$
//! y = z - H \bar{x}, \qquad S = H \bar{P} H^T + R, \qquad K = \bar{P} H^T S^{-1}
//! $$
//!
//! $$
//! x^+ = \bar{x} + K y, \qquad P^+ = (I - K H) \bar{P}
//! $$
//!
//! $S$ is inverted explicitly. A singular or ill-conditioned $S$ is reported as
//! [`EstimationError::NumericalInstability`]; there is no regularization fallback.
//! After every update the posterior covariance is checked: a non-finite entry or a
//! diagonal below `-COVARIANCE_TOLERANCE` is an [`EstimationError::InvariantViolation`],
//! asymmetry above `SYMMETRY_TOLERANCE` is logged as a warning.

use std::fmt::{self, Display};

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::error::{EstimationError, Result};
use crate::kinematics::SystemMatrices;
use crate::linalg::{
    asymmetry, checked_inverse, is_positive_semi_definite, min_diagonal, symmetrize,
};
use crate::measurements::MeasurementModel;
use crate::{InputModel, StateEstimator};

/// Most negative diagonal covariance entry accepted as round-off.
pub const COVARIANCE_TOLERANCE: f64 = 1e-9;
/// Relative asymmetry ‖P − Pᵀ‖ / max(1, ‖P‖) above which a warning is logged.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Gaussian belief over the state: mean vector and covariance matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanState {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}
impl KalmanState {
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let n = mean.len();
        if n == 0 {
            return Err(EstimationError::invalid("state mean is empty"));
        }
        if covariance.shape() != (n, n) {
            return Err(EstimationError::invalid(format!(
                "covariance must be {n}x{n} for a {n}-element mean, got {}x{}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        Ok(KalmanState { mean, covariance })
    }
    /// Prior with a diagonal covariance.
    pub fn from_diagonal(mean: Vec<f64>, covariance_diagonal: Vec<f64>) -> Result<Self> {
        let covariance = DMatrix::from_diagonal(&DVector::from_vec(covariance_diagonal));
        KalmanState::new(DVector::from_vec(mean), covariance)
    }
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }
}
impl Display for KalmanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalmanState")
            .field("mean", &self.mean.as_slice())
            .field("variances", &self.covariance.diagonal().as_slice())
            .finish()
    }
}

/// Prediction half of the cycle: `x̄ = F x + G u`, `P̄ = F P Fᵀ + Γ Q Γᵀ`.
pub fn predict<C: InputModel + ?Sized>(
    state: &KalmanState,
    control: &C,
    system: &SystemMatrices,
) -> Result<KalmanState> {
    check_dimensions(state, system)?;
    let u = control.get_vector();
    if u.len() != system.control_size() {
        return Err(EstimationError::invalid(format!(
            "control input has dimension {}, expected {}",
            u.len(),
            system.control_size()
        )));
    }
    let f = &system.transition;
    let gamma = &system.noise_input;
    let mean = f * &state.mean + &system.control * u;
    let covariance = f * &state.covariance * f.transpose()
        + gamma * &system.process_noise * gamma.transpose();
    Ok(KalmanState { mean, covariance })
}

/// Correction half of the cycle.
///
/// # Arguments
/// * `prior` - predicted belief `(x̄, P̄)`
/// * `measurement` - observation `z`
/// * `system` - constant system matrices (uses `H` and `R`)
/// * `step` - step index used to label failures
///
/// # Returns
/// * `Ok((posterior, innovation))` on success.
/// * `Err(NumericalInstability)` if `S` cannot be inverted.
/// * `Err(InvariantViolation)` if the posterior is non-finite or loses positive
///   semi-definiteness on the diagonal.
pub fn update<M: MeasurementModel + ?Sized>(
    prior: &KalmanState,
    measurement: &M,
    system: &SystemMatrices,
    step: usize,
) -> Result<(KalmanState, DVector<f64>)> {
    check_dimensions(prior, system)?;
    let z = measurement.get_vector();
    if z.len() != system.measurement_size() {
        return Err(EstimationError::invalid(format!(
            "measurement has dimension {}, expected {}",
            z.len(),
            system.measurement_size()
        )));
    }
    let h = &system.observation;
    let innovation = z - h * &prior.mean;
    let s = h * &prior.covariance * h.transpose() + &system.measurement_noise;
    let s_inv = checked_inverse(&s).ok_or_else(|| EstimationError::NumericalInstability {
        step,
        quantity: "innovation covariance S".to_string(),
    })?;
    let gain = &prior.covariance * h.transpose() * s_inv;
    let mean = &prior.mean + &gain * &innovation;
    let identity = DMatrix::<f64>::identity(prior.dimension(), prior.dimension());
    let covariance = (identity - &gain * h) * &prior.covariance;

    if mean.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::InvariantViolation {
            step,
            quantity: "posterior mean".to_string(),
            detail: "contains non-finite entries".to_string(),
        });
    }
    check_covariance(&covariance, step)?;
    Ok((KalmanState { mean, covariance }, innovation))
}

/// One full predict-then-update cycle. Pure: the caller owns the state between steps.
pub fn kalman_step<C, M>(
    prior: &KalmanState,
    control: &C,
    measurement: &M,
    system: &SystemMatrices,
    step: usize,
) -> Result<KalmanState>
where
    C: InputModel + ?Sized,
    M: MeasurementModel + ?Sized,
{
    let predicted = predict(prior, control, system)?;
    let (posterior, _innovation) = update(&predicted, measurement, system, step)?;
    Ok(posterior)
}

/// Validate a posterior covariance.
///
/// Hard failures: non-finite entries, diagonal below `-COVARIANCE_TOLERANCE`.
/// Soft failure (logged): asymmetry above `SYMMETRY_TOLERANCE`.
pub fn check_covariance(covariance: &DMatrix<f64>, step: usize) -> Result<()> {
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::InvariantViolation {
            step,
            quantity: "posterior covariance".to_string(),
            detail: "contains non-finite entries".to_string(),
        });
    }
    let smallest = min_diagonal(covariance);
    if smallest < -COVARIANCE_TOLERANCE {
        return Err(EstimationError::InvariantViolation {
            step,
            quantity: "posterior covariance".to_string(),
            detail: format!("has negative diagonal entry {smallest:e}"),
        });
    }
    let skew = asymmetry(covariance) / covariance.norm().max(1.0);
    if skew > SYMMETRY_TOLERANCE {
        warn!("step {step}: posterior covariance asymmetry {skew:e} exceeds tolerance");
    }
    Ok(())
}

fn check_dimensions(state: &KalmanState, system: &SystemMatrices) -> Result<()> {
    if state.dimension() != system.state_size() {
        return Err(EstimationError::invalid(format!(
            "state has dimension {}, system expects {}",
            state.dimension(),
            system.state_size()
        )));
    }
    Ok(())
}

/// Kalman filter that owns its belief and the constant system matrices.
///
/// Each call to [`LinearKalmanFilter::step`] runs one predict/update cycle. A
/// failing step leaves the stored belief untouched, so everything estimated up to
/// that point stays valid.
#[derive(Clone, Debug)]
pub struct LinearKalmanFilter {
    state: KalmanState,
    system: SystemMatrices,
    steps: usize,
    enforce_symmetry: bool,
    last_innovation: Option<DVector<f64>>,
}
impl Display for LinearKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearKalmanFilter")
            .field("steps", &self.steps)
            .field("mean", &self.state.mean.as_slice())
            .field("variances", &self.state.covariance.diagonal().as_slice())
            .field("enforce_symmetry", &self.enforce_symmetry)
            .finish()
    }
}
impl LinearKalmanFilter {
    /// # Errors
    /// `InvalidInput` if the belief does not match the system or its covariance
    /// has an eigenvalue below `-COVARIANCE_TOLERANCE`.
    pub fn new(initial: KalmanState, system: SystemMatrices) -> Result<Self> {
        check_dimensions(&initial, &system)?;
        if !is_positive_semi_definite(&initial.covariance, COVARIANCE_TOLERANCE) {
            return Err(EstimationError::invalid(format!(
                "initial covariance is not positive semi-definite: {}",
                initial
            )));
        }
        Ok(LinearKalmanFilter {
            state: initial,
            system,
            steps: 0,
            enforce_symmetry: false,
            last_innovation: None,
        })
    }
    /// Replace the posterior covariance by `0.5 (P + Pᵀ)` after every update.
    pub fn with_symmetry_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_symmetry = enforce;
        self
    }
    /// Run one predict/update cycle and return the new belief.
    pub fn step<C, M>(&mut self, control: &C, measurement: &M) -> Result<&KalmanState>
    where
        C: InputModel + ?Sized,
        M: MeasurementModel + ?Sized,
    {
        let predicted = predict(&self.state, control, &self.system)?;
        self.apply_update(predicted, measurement)?;
        Ok(&self.state)
    }
    fn apply_update<M: MeasurementModel + ?Sized>(
        &mut self,
        predicted: KalmanState,
        measurement: &M,
    ) -> Result<()> {
        let (mut posterior, innovation) =
            update(&predicted, measurement, &self.system, self.steps)?;
        if self.enforce_symmetry {
            posterior.covariance = symmetrize(&posterior.covariance);
        }
        debug!(
            "step {}: innovation norm {:.6}, covariance trace {:.6}",
            self.steps,
            innovation.norm(),
            posterior.covariance.trace()
        );
        self.state = posterior;
        self.last_innovation = Some(innovation);
        self.steps += 1;
        Ok(())
    }
    pub fn state(&self) -> &KalmanState {
        &self.state
    }
    pub fn system(&self) -> &SystemMatrices {
        &self.system
    }
    /// Number of completed update steps.
    pub fn steps_completed(&self) -> usize {
        self.steps
    }
    /// Innovation `z − H x̄` of the most recent update.
    pub fn last_innovation(&self) -> Option<&DVector<f64>> {
        self.last_innovation.as_ref()
    }
}
impl StateEstimator for LinearKalmanFilter {
    fn predict<C: InputModel + ?Sized>(&mut self, control: &C) -> Result<()> {
        self.state = predict(&self.state, control, &self.system)?;
        Ok(())
    }
    fn update<M: MeasurementModel + ?Sized>(&mut self, measurement: &M) -> Result<()> {
        let predicted = self.state.clone();
        self.apply_update(predicted, measurement)
    }
    fn get_estimate(&self) -> DVector<f64> {
        self.state.mean.clone()
    }
    fn get_certainty(&self) -> DMatrix<f64> {
        self.state.covariance.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::{ControlInput, PositionMeasurement, VectorMeasurement};
    use crate::noise::NoiseModel;
    use assert_approx_eq::assert_approx_eq;

    /// 2-D position-only system with F = H = Q = R = I and no control or process input.
    fn static_system() -> SystemMatrices {
        SystemMatrices::new(
            DMatrix::identity(2, 2),
            DMatrix::zeros(2, 2),
            DMatrix::zeros(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
        )
        .unwrap()
    }

    fn tracking_system(dt: f64) -> SystemMatrices {
        SystemMatrices::constant_velocity(
            dt,
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2) * 4.0,
        )
        .unwrap()
    }

    #[test]
    fn single_step_textbook_gain() {
        let prior = KalmanState::from_diagonal(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let posterior = kalman_step(
            &prior,
            &ControlInput::zero(),
            &PositionMeasurement::new(2.0, 2.0),
            &static_system(),
            0,
        )
        .unwrap();
        assert_approx_eq!(posterior.mean[0], 1.0, 1e-6);
        assert_approx_eq!(posterior.mean[1], 1.0, 1e-6);
        assert_approx_eq!(posterior.covariance[(0, 0)], 0.5, 1e-12);
        assert_approx_eq!(posterior.covariance[(1, 1)], 0.5, 1e-12);
        assert_approx_eq!(posterior.covariance[(0, 1)], 0.0, 1e-12);
    }

    #[test]
    fn predict_follows_transition_and_control() {
        let system = tracking_system(1.0);
        let prior = KalmanState::from_diagonal(vec![1.0, 2.0, 0.5, -0.5], vec![0.0; 4]).unwrap();
        let predicted = predict(&prior, &ControlInput::new(1.0, 2.0), &system).unwrap();
        // x = 1 + 0.5 + 1, y = 2 - 0.5 + 2, vx = 0.5 + 1, vy = -0.5 + 2
        assert_approx_eq!(predicted.mean[0], 2.5);
        assert_approx_eq!(predicted.mean[1], 3.5);
        assert_approx_eq!(predicted.mean[2], 1.5);
        assert_approx_eq!(predicted.mean[3], 1.5);
        // P̄ = Γ Q Γᵀ when P = 0
        assert_approx_eq!(predicted.covariance[(0, 0)], 1.0);
        assert_approx_eq!(predicted.covariance[(0, 2)], 1.0);
        assert_approx_eq!(predicted.covariance[(2, 2)], 1.0);
        assert_approx_eq!(predicted.covariance[(0, 1)], 0.0);
    }

    #[test]
    fn update_reports_innovation() {
        let prior = KalmanState::from_diagonal(vec![1.0, -1.0], vec![1.0, 1.0]).unwrap();
        let (_, innovation) =
            update(&prior, &PositionMeasurement::new(3.0, 0.0), &static_system(), 0).unwrap();
        assert_approx_eq!(innovation[0], 2.0);
        assert_approx_eq!(innovation[1], 1.0);
    }

    #[test]
    fn singular_innovation_covariance_is_fatal() {
        let mut system = static_system();
        system.measurement_noise = DMatrix::zeros(2, 2);
        let prior = KalmanState::from_diagonal(vec![0.0, 0.0], vec![0.0, 0.0]).unwrap();
        let err = kalman_step(
            &prior,
            &ControlInput::zero(),
            &PositionMeasurement::new(1.0, 1.0),
            &system,
            17,
        )
        .unwrap_err();
        match err {
            EstimationError::NumericalInstability { step, quantity } => {
                assert_eq!(step, 17);
                assert!(quantity.contains("innovation covariance"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn negative_variance_is_an_invariant_violation() {
        // observe only the first coordinate; the second keeps its (invalid) negative variance
        let system = SystemMatrices::new(
            DMatrix::identity(2, 2),
            DMatrix::zeros(2, 1),
            DMatrix::zeros(2, 1),
            DMatrix::zeros(1, 1),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DMatrix::identity(1, 1),
        )
        .unwrap();
        let prior = KalmanState::from_diagonal(vec![0.0, 0.0], vec![1.0, -1.0]).unwrap();
        let err = kalman_step(
            &prior,
            &DVector::<f64>::zeros(1),
            &VectorMeasurement(DVector::from_vec(vec![1.0])),
            &system,
            3,
        )
        .unwrap_err();
        assert!(matches!(err, EstimationError::InvariantViolation { step: 3, .. }));
    }

    #[test]
    fn dimension_mismatches_are_rejected() {
        let system = tracking_system(0.1);
        let prior = KalmanState::from_diagonal(vec![0.0; 2], vec![1.0; 2]).unwrap();
        assert!(matches!(
            predict(&prior, &ControlInput::zero(), &system),
            Err(EstimationError::InvalidInput(_))
        ));
        let prior = KalmanState::from_diagonal(vec![0.0; 4], vec![1.0; 4]).unwrap();
        assert!(matches!(
            predict(&prior, &DVector::<f64>::zeros(3), &system),
            Err(EstimationError::InvalidInput(_))
        ));
        let z = VectorMeasurement(DVector::zeros(3));
        assert!(matches!(
            update(&prior, &z, &system, 0),
            Err(EstimationError::InvalidInput(_))
        ));
        assert!(KalmanState::new(DVector::zeros(4), DMatrix::identity(3, 3)).is_err());
        assert!(LinearKalmanFilter::new(
            KalmanState::from_diagonal(vec![0.0; 3], vec![1.0; 3]).unwrap(),
            system
        )
        .is_err());
    }

    #[test]
    fn covariance_stays_symmetric_and_positive() {
        let dt = 8.0 / 99.0;
        let system = tracking_system(dt);
        let initial = KalmanState::from_diagonal(vec![1.0, 1.0, 0.0, 0.0], vec![0.1; 4]).unwrap();
        let mut filter = LinearKalmanFilter::new(initial, system).unwrap();
        let mut noise = NoiseModel::new(1.0, 2.0, 1664).unwrap();
        for k in 0..200 {
            let t = k as f64 * dt;
            let z = PositionMeasurement::new(noise.perturb(t), noise.perturb(-t));
            let state = filter.step(&ControlInput::new(t.sin(), t.cos()), &z).unwrap();
            assert!(asymmetry(&state.covariance) < 1e-9);
            assert!(min_diagonal(&state.covariance) > 0.0);
        }
        assert_eq!(filter.steps_completed(), 200);
        assert!(filter.last_innovation().is_some());
    }

    #[test]
    fn filter_rejects_indefinite_prior() {
        // positive diagonal, but eigenvalues 3 and -1
        let covariance = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let prior = KalmanState::new(DVector::zeros(2), covariance).unwrap();
        let result = LinearKalmanFilter::new(prior, static_system());
        assert!(matches!(result, Err(EstimationError::InvalidInput(_))));

        let zero = KalmanState::from_diagonal(vec![0.0, 0.0], vec![0.0, 0.0]).unwrap();
        assert!(LinearKalmanFilter::new(zero, static_system()).is_ok());
    }

    #[test]
    fn failed_step_keeps_previous_belief() {
        let mut system = static_system();
        system.measurement_noise = DMatrix::zeros(2, 2);
        system.process_noise = DMatrix::zeros(2, 2);
        let prior = KalmanState::from_diagonal(vec![1.0, 2.0], vec![0.0, 0.0]).unwrap();
        let mut filter = LinearKalmanFilter::new(prior.clone(), system).unwrap();
        let result = filter.step(&ControlInput::zero(), &PositionMeasurement::new(0.0, 0.0));
        assert!(result.is_err());
        assert_eq!(filter.state(), &prior);
        assert_eq!(filter.steps_completed(), 0);
    }

    #[test]
    fn trait_predict_update_matches_step() {
        let system = tracking_system(0.5);
        let initial = KalmanState::from_diagonal(vec![0.0, 0.0, 1.0, 1.0], vec![1.0; 4]).unwrap();
        let u = ControlInput::new(0.2, -0.1);
        let z = PositionMeasurement::new(0.7, 0.4);

        let mut a = LinearKalmanFilter::new(initial.clone(), system.clone()).unwrap();
        a.step(&u, &z).unwrap();

        let mut b = LinearKalmanFilter::new(initial, system).unwrap();
        StateEstimator::predict(&mut b, &u).unwrap();
        StateEstimator::update(&mut b, &z).unwrap();

        assert!((a.get_estimate() - b.get_estimate()).norm() < 1e-12);
        assert!((a.get_certainty() - b.get_certainty()).norm() < 1e-12);
        assert_eq!(b.steps_completed(), 1);
    }

    #[test]
    fn symmetry_enforcement_gives_exact_symmetry() {
        let system = tracking_system(0.3);
        let initial = KalmanState::from_diagonal(vec![0.0; 4], vec![2.0, 1.0, 0.5, 0.25]).unwrap();
        let mut filter = LinearKalmanFilter::new(initial, system)
            .unwrap()
            .with_symmetry_enforcement(true);
        for k in 0..20 {
            let z = PositionMeasurement::new(k as f64 * 0.1, 0.0);
            filter.step(&ControlInput::zero(), &z).unwrap();
        }
        let p = filter.get_certainty();
        assert_eq!(p, p.transpose());
    }

    #[test]
    fn display_lists_mean() {
        let state = KalmanState::from_diagonal(vec![1.0, 2.0], vec![0.5, 0.5]).unwrap();
        let text = format!("{}", state);
        assert!(text.contains("KalmanState"));
        assert!(text.contains("mean"));
    }
}
