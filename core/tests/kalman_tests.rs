//! End-to-end tests for the linear Kalman tracker.
//!
//! These drive [`LinearKalmanFilter`] through [`run_kalman_filter`] and the full
//! [`simulate_kalman`] scenario. The error bounds are regression checks derived
//! from running the scenarios, not theoretical guarantees.
use assert_approx_eq::assert_approx_eq;
use nalgebra::{DMatrix, DVector};

use trackest::EstimationError;
use trackest::kalman::{KalmanState, LinearKalmanFilter};
use trackest::kinematics::{HarmonicControl, SystemMatrices, sample_controls, uniform_grid};
use trackest::measurements::{ControlInput, PositionMeasurement};
use trackest::sim::{KalmanScenario, run_kalman_filter, simulate_kalman};

fn position_rmse(pairs: impl Iterator<Item = (f64, f64, f64, f64)>) -> f64 {
    let (sum, n) = pairs.fold((0.0, 0usize), |(s, n), (x, y, tx, ty)| {
        (s + (x - tx).powi(2) + (y - ty).powi(2), n + 1)
    });
    (sum / n as f64).sqrt()
}

#[test]
fn noise_free_track_converges_to_truth() {
    let dt = 0.1;
    let system = SystemMatrices::constant_velocity(
        dt,
        DMatrix::zeros(2, 2),
        DMatrix::identity(2, 2) * 1e-6,
    )
    .unwrap();
    let times = uniform_grid(0.0, 6.0, 61);
    let controls = sample_controls(&times, &HarmonicControl::default());
    let truth_initial = DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0]);
    let truth = system.propagate(&truth_initial, &controls).unwrap();
    let measurements: Vec<PositionMeasurement> = truth
        .iter()
        .map(|x| PositionMeasurement::new(x[0], x[1]))
        .collect();

    // start well away from the truth
    let prior = KalmanState::from_diagonal(vec![3.0, -2.0, 1.0, 1.0], vec![10.0; 4]).unwrap();
    let mut filter = LinearKalmanFilter::new(prior, system).unwrap();
    let outcome = run_kalman_filter(&mut filter, &times, &controls, &measurements).unwrap();
    assert!(outcome.is_complete());
    let estimates = outcome.into_result().unwrap();
    assert_eq!(estimates.len(), times.len());

    let last = estimates.last().unwrap();
    let true_last = truth.last().unwrap();
    for i in 0..2 {
        assert_approx_eq!(last.mean[i], true_last[i], 1e-2);
    }
    for i in 2..4 {
        assert_approx_eq!(last.mean[i], true_last[i], 5e-2);
    }
    for i in 0..4 {
        assert!(last.covariance[(i, i)] >= -1e-9);
        assert!(last.covariance[(i, i)] < 1e-2);
    }
}

#[test]
fn default_scenario_tracks_better_than_raw_fixes() {
    let outcome = simulate_kalman(&KalmanScenario::default()).unwrap();
    assert!(outcome.is_complete());
    let records = outcome.steps;
    assert_eq!(records.len(), 99);
    assert_eq!(records.first().unwrap().step, 1);
    assert_eq!(records.last().unwrap().step, 99);
    assert_approx_eq!(records.last().unwrap().time, 8.0, 1e-9);

    let raw = position_rmse(
        records
            .iter()
            .map(|r| (r.measured_x, r.measured_y, r.true_x, r.true_y)),
    );
    let filtered = position_rmse(
        records
            .iter()
            .map(|r| (r.estimate_x, r.estimate_y, r.true_x, r.true_y)),
    );
    assert!(
        filtered < raw,
        "filtered RMSE {filtered} should be below raw RMSE {raw}"
    );
    assert!(records.iter().all(|r| r.variance_x > 0.0 && r.variance_y > 0.0));
}

#[test]
fn scenario_is_reproducible_for_a_seed() {
    let scenario = KalmanScenario {
        seed: 11,
        ..KalmanScenario::default()
    };
    let first = simulate_kalman(&scenario).unwrap().into_result().unwrap();
    let second = simulate_kalman(&scenario).unwrap().into_result().unwrap();
    assert_eq!(first, second);

    let other = simulate_kalman(&KalmanScenario {
        seed: 12,
        ..scenario
    })
    .unwrap()
    .into_result()
    .unwrap();
    assert_ne!(first, other);
}

#[test]
fn mismatched_sequences_are_rejected_before_any_step() {
    let system = SystemMatrices::constant_velocity(
        0.1,
        DMatrix::identity(2, 2),
        DMatrix::identity(2, 2),
    )
    .unwrap();
    let prior = KalmanState::from_diagonal(vec![0.0; 4], vec![1.0; 4]).unwrap();
    let mut filter = LinearKalmanFilter::new(prior, system).unwrap();
    let times = [0.1, 0.2, 0.3];
    let controls = [ControlInput::zero(); 3];
    let measurements = [PositionMeasurement::new(0.0, 0.0); 2];
    let result = run_kalman_filter(&mut filter, &times, &controls, &measurements);
    assert!(matches!(result, Err(EstimationError::InvalidInput(_))));
    assert_eq!(filter.steps_completed(), 0);
}

#[test]
fn invalid_measurement_keeps_completed_steps() {
    let system = SystemMatrices::constant_velocity(
        0.1,
        DMatrix::identity(2, 2),
        DMatrix::identity(2, 2),
    )
    .unwrap();
    let prior = KalmanState::from_diagonal(vec![0.0; 4], vec![1.0; 4]).unwrap();
    let mut filter = LinearKalmanFilter::new(prior, system).unwrap();
    let times = [0.1, 0.2, 0.3, 0.4, 0.5];
    let controls = [ControlInput::new(0.5, -0.5); 5];
    let mut measurements = vec![PositionMeasurement::new(0.1, 0.2); 5];
    measurements[3] = PositionMeasurement::new(f64::NAN, 0.0);

    let outcome = run_kalman_filter(&mut filter, &times, &controls, &measurements).unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.steps.len(), 3);
    let failure = outcome.failure.as_ref().unwrap();
    assert!(matches!(
        failure,
        EstimationError::InvariantViolation { .. }
    ));
    assert_eq!(failure.step(), Some(3));
    // the filter still holds the last good belief
    assert_eq!(filter.steps_completed(), 3);
    assert_eq!(filter.state().mean, outcome.steps[2].mean);
    assert!(outcome.into_result().is_err());
}

#[test]
fn singular_innovation_covariance_stops_the_run() {
    // no uncertainty anywhere: S = H P Hᵀ + R is the zero matrix
    let system =
        SystemMatrices::constant_velocity(0.1, DMatrix::zeros(2, 2), DMatrix::zeros(2, 2)).unwrap();
    let prior = KalmanState::from_diagonal(vec![0.0; 4], vec![0.0; 4]).unwrap();
    let mut filter = LinearKalmanFilter::new(prior, system).unwrap();
    let times = [0.1, 0.2];
    let controls = [ControlInput::zero(); 2];
    let measurements = [PositionMeasurement::new(1.0, 1.0); 2];

    let outcome = run_kalman_filter(&mut filter, &times, &controls, &measurements).unwrap();
    assert!(outcome.steps.is_empty());
    match outcome.failure {
        Some(EstimationError::NumericalInstability { step, ref quantity }) => {
            assert_eq!(step, 0);
            assert!(quantity.contains("innovation covariance"));
        }
        ref other => panic!("expected a numerical instability, got {other:?}"),
    }
}
