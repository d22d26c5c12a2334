//! Measurement and control-input containers for the tracking filters.
//!
//! This module defines the generic measurement model trait consumed by the
//! Kalman update and the two concrete vectors the kinematic tracker works with:
//! a noisy planar position fix and a planar acceleration command.

use std::fmt::{self, Display};

use nalgebra::DVector;

use crate::InputModel;

/// Generic measurement model trait for all types of measurements
pub trait MeasurementModel {
    /// Get the dimension of the measurement vector
    fn get_dimension(&self) -> usize;
    /// Get the measurement in a vector format
    fn get_vector(&self) -> DVector<f64>;
}

/// Planar position observation `z = [x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionMeasurement {
    pub x: f64,
    pub y: f64,
}
impl PositionMeasurement {
    pub fn new(x: f64, y: f64) -> Self {
        PositionMeasurement { x, y }
    }
}
impl Display for PositionMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionMeasurement(x: {:.4}, y: {:.4})", self.x, self.y)
    }
}
impl From<(f64, f64)> for PositionMeasurement {
    fn from(xy: (f64, f64)) -> Self {
        PositionMeasurement::new(xy.0, xy.1)
    }
}
impl MeasurementModel for PositionMeasurement {
    fn get_dimension(&self) -> usize {
        2
    }
    fn get_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.x, self.y])
    }
}

/// Raw measurement vector of arbitrary dimension.
///
/// Used when the observation matrix does not select a planar position, e.g. for
/// reduced or augmented state models.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorMeasurement(pub DVector<f64>);
impl MeasurementModel for VectorMeasurement {
    fn get_dimension(&self) -> usize {
        self.0.len()
    }
    fn get_vector(&self) -> DVector<f64> {
        self.0.clone()
    }
}

/// Planar acceleration command `u = [a_x, a_y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlInput {
    pub accel_x: f64,
    pub accel_y: f64,
}
impl ControlInput {
    pub fn new(accel_x: f64, accel_y: f64) -> Self {
        ControlInput { accel_x, accel_y }
    }
    /// Zero command, used when a scenario has no driving input.
    pub fn zero() -> Self {
        ControlInput::default()
    }
}
impl Display for ControlInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ControlInput(ax: {:.4}, ay: {:.4})",
            self.accel_x, self.accel_y
        )
    }
}
impl InputModel for ControlInput {
    fn get_dimension(&self) -> usize {
        2
    }
    fn get_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.accel_x, self.accel_y])
    }
}
impl InputModel for DVector<f64> {
    fn get_dimension(&self) -> usize {
        self.len()
    }
    fn get_vector(&self) -> DVector<f64> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn position_measurement_vector() {
        let z = PositionMeasurement::new(1.5, -2.0);
        assert_eq!(z.get_dimension(), 2);
        let v = z.get_vector();
        assert_approx_eq!(v[0], 1.5);
        assert_approx_eq!(v[1], -2.0);
        assert_eq!(PositionMeasurement::from((1.5, -2.0)), z);
    }

    #[test]
    fn position_measurement_display() {
        let z = PositionMeasurement::new(1.0, 2.0);
        assert_eq!(format!("{}", z), "PositionMeasurement(x: 1.0000, y: 2.0000)");
    }

    #[test]
    fn vector_measurement_dimension() {
        let z = VectorMeasurement(DVector::from_vec(vec![1.0, 2.0, 3.0]));
        assert_eq!(z.get_dimension(), 3);
        assert_eq!(z.get_vector(), DVector::from_vec(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn control_input_vector() {
        let u = ControlInput::new(0.5, -0.25);
        assert_eq!(u.get_dimension(), 2);
        let v = u.get_vector();
        assert_approx_eq!(v[0], 0.5);
        assert_approx_eq!(v[1], -0.25);
        assert_eq!(ControlInput::zero().get_vector(), DVector::zeros(2));
    }
}
