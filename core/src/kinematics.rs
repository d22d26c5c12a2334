//! Planar kinematic model: system matrices, driving functions and ground truth.
//!
//! The tracked state is the four-element planar vector
//!
//! $$
//! x = [p_x, p_y, v_x, v_y]
//! $$
//!
//! driven by a two-element acceleration command $u = [a_x, a_y]$. Over a fixed
//! step interval $\Delta t$ the discrete model used by the Kalman filter is
//!
//! $$
//! x_{k+1} = F x_k + G u_k + \Gamma w_k, \qquad z_k = H x_k + v_k
//! $$
//!
//! with $w_k \sim N(0, Q)$ and $v_k \sim N(0, R)$. The ground truth used to
//! synthesize observations is produced separately by integrating the continuous
//! dynamics $\dot{p} = v$, $\dot{v} = u(t)$ with a fixed-step integrator, so the
//! filter never sees the exact model that generated its data.

use nalgebra::{DMatrix, DVector, SVector, Vector4};
use serde::{Deserialize, Serialize};

use crate::InputModel;
use crate::error::{EstimationError, Result};
use crate::measurements::ControlInput;

/// Number of kinematic states `[p_x, p_y, v_x, v_y]`.
pub const STATE_SIZE: usize = 4;
/// Number of control inputs `[a_x, a_y]`.
pub const CONTROL_SIZE: usize = 2;
/// Number of observed quantities `[p_x, p_y]`.
pub const MEASUREMENT_SIZE: usize = 2;

/// Constant matrices of a discrete linear-Gaussian system.
///
/// Built once per run from the step interval and the noise configuration, never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemMatrices {
    /// State transition `F` (n × n)
    pub transition: DMatrix<f64>,
    /// Control input matrix `G` (n × m)
    pub control: DMatrix<f64>,
    /// Process noise input matrix `Γ` (n × p)
    pub noise_input: DMatrix<f64>,
    /// Process noise covariance `Q` (p × p)
    pub process_noise: DMatrix<f64>,
    /// Observation matrix `H` (k × n)
    pub observation: DMatrix<f64>,
    /// Measurement noise covariance `R` (k × k)
    pub measurement_noise: DMatrix<f64>,
}
impl SystemMatrices {
    /// Assemble a system from explicit matrices, checking that every shape agrees
    /// with the state size implied by `transition`.
    pub fn new(
        transition: DMatrix<f64>,
        control: DMatrix<f64>,
        noise_input: DMatrix<f64>,
        process_noise: DMatrix<f64>,
        observation: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
    ) -> Result<Self> {
        let n = transition.nrows();
        if n == 0 || !transition.is_square() {
            return Err(EstimationError::invalid(format!(
                "transition matrix must be square and non-empty, got {}x{}",
                transition.nrows(),
                transition.ncols()
            )));
        }
        if control.nrows() != n {
            return Err(shape_error("control", n, control.nrows()));
        }
        if noise_input.nrows() != n {
            return Err(shape_error("noise input", n, noise_input.nrows()));
        }
        let p = noise_input.ncols();
        if process_noise.shape() != (p, p) {
            return Err(EstimationError::invalid(format!(
                "process noise must be {p}x{p} to match the noise input, got {}x{}",
                process_noise.nrows(),
                process_noise.ncols()
            )));
        }
        if observation.ncols() != n {
            return Err(EstimationError::invalid(format!(
                "observation matrix must have {n} columns, got {}",
                observation.ncols()
            )));
        }
        let k = observation.nrows();
        if measurement_noise.shape() != (k, k) {
            return Err(EstimationError::invalid(format!(
                "measurement noise must be {k}x{k}, got {}x{}",
                measurement_noise.nrows(),
                measurement_noise.ncols()
            )));
        }
        Ok(SystemMatrices {
            transition,
            control,
            noise_input,
            process_noise,
            observation,
            measurement_noise,
        })
    }
    /// Planar kinematic model over a step interval `dt`.
    ///
    /// $$
    /// F = \begin{bmatrix} 1 & 0 & \Delta t & 0 \\\\ 0 & 1 & 0 & \Delta t \\\\ 0 & 0 & 1 & 0 \\\\ 0 & 0 & 0 & 1 \end{bmatrix},
    /// \quad G = \Gamma = \begin{bmatrix} \Delta t^2 & 0 \\\\ 0 & \Delta t^2 \\\\ \Delta t & 0 \\\\ 0 & \Delta t \end{bmatrix},
    /// \quad H = \begin{bmatrix} 1 & 0 & 0 & 0 \\\\ 0 & 1 & 0 & 0 \end{bmatrix}
    /// $$
    ///
    /// # Arguments
    /// * `dt` - step interval, must be positive
    /// * `process_noise` - 2x2 process noise covariance `Q`
    /// * `measurement_noise` - 2x2 measurement noise covariance `R`
    pub fn constant_velocity(
        dt: f64,
        process_noise: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
    ) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(EstimationError::invalid(format!(
                "step interval must be positive, got {dt}"
            )));
        }
        #[rustfmt::skip]
        let transition = DMatrix::from_row_slice(STATE_SIZE, STATE_SIZE, &[
            1.0, 0.0, dt,  0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]);
        let dt2 = dt * dt;
        #[rustfmt::skip]
        let control = DMatrix::from_row_slice(STATE_SIZE, CONTROL_SIZE, &[
            dt2, 0.0,
            0.0, dt2,
            dt,  0.0,
            0.0, dt,
        ]);
        let noise_input = control.clone();
        #[rustfmt::skip]
        let observation = DMatrix::from_row_slice(MEASUREMENT_SIZE, STATE_SIZE, &[
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        ]);
        SystemMatrices::new(
            transition,
            control,
            noise_input,
            process_noise,
            observation,
            measurement_noise,
        )
    }
    pub fn state_size(&self) -> usize {
        self.transition.nrows()
    }
    pub fn control_size(&self) -> usize {
        self.control.ncols()
    }
    pub fn measurement_size(&self) -> usize {
        self.observation.nrows()
    }
    /// Noise-free propagation `x_{k+1} = F x_k + G u_k` over a control sequence.
    ///
    /// Returns one state per control, i.e. the state *after* applying it.
    pub fn propagate<C: InputModel>(
        &self,
        initial: &DVector<f64>,
        controls: &[C],
    ) -> Result<Vec<DVector<f64>>> {
        if initial.len() != self.state_size() {
            return Err(shape_error("initial state", self.state_size(), initial.len()));
        }
        let mut state = initial.clone();
        let mut states = Vec::with_capacity(controls.len());
        for control in controls {
            let u = control.get_vector();
            if u.len() != self.control_size() {
                return Err(shape_error("control input", self.control_size(), u.len()));
            }
            state = &self.transition * &state + &self.control * u;
            states.push(state.clone());
        }
        Ok(states)
    }
    /// Observe a state through `H`.
    pub fn observe(&self, state: &DVector<f64>) -> DVector<f64> {
        &self.observation * state
    }
}

fn shape_error(what: &str, expected: usize, got: usize) -> EstimationError {
    EstimationError::invalid(format!(
        "{what} has dimension {got}, expected {expected}"
    ))
}

/// Closed-form driving function `t → u(t)`.
pub trait ControlProfile {
    fn control(&self, t: f64) -> ControlInput;
}
impl<F> ControlProfile for F
where
    F: Fn(f64) -> ControlInput,
{
    fn control(&self, t: f64) -> ControlInput {
        self(t)
    }
}

/// Harmonic acceleration `u_x = a_x sin t`, `u_y = a_y cos t`.
///
/// The default amplitudes (2.5, -2.0) trace a drifting loop in the plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonicControl {
    pub amplitude_x: f64,
    pub amplitude_y: f64,
}
impl Default for HarmonicControl {
    fn default() -> Self {
        HarmonicControl {
            amplitude_x: 2.5,
            amplitude_y: -2.0,
        }
    }
}
impl ControlProfile for HarmonicControl {
    fn control(&self, t: f64) -> ControlInput {
        ControlInput::new(self.amplitude_x * t.sin(), self.amplitude_y * t.cos())
    }
}

/// Sample a control profile on a time grid.
pub fn sample_controls<P: ControlProfile + ?Sized>(times: &[f64], profile: &P) -> Vec<ControlInput> {
    times.iter().map(|&t| profile.control(t)).collect()
}

/// `count` evenly spaced points on `[start, end]`, both ends included.
pub fn uniform_grid(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Fixed step interval of a uniform time grid.
///
/// # Returns
/// * `Ok(dt)` taken from the first two points.
/// * `Err(InvalidInput)` if the grid has fewer than two points or does not increase.
pub fn step_interval(times: &[f64]) -> Result<f64> {
    if times.len() < 2 {
        return Err(EstimationError::invalid(format!(
            "a time grid needs at least two points to define a step, got {}",
            times.len()
        )));
    }
    let dt = times[1] - times[0];
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(EstimationError::invalid(format!(
            "time grid must be strictly increasing, first step is {dt}"
        )));
    }
    Ok(dt)
}

/// Fixed-step integration scheme for the ground-truth generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// Second-order explicit midpoint rule
    #[default]
    Midpoint,
    /// Classic fourth-order Runge-Kutta
    RungeKutta4,
}
impl Integrator {
    /// Advance `x` from `t` to `t + dt` under `dx/dt = f(t, x)`.
    pub fn step<const N: usize, F>(&self, x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
    where
        F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
    {
        match self {
            Integrator::Midpoint => midpoint(x, t, dt, f),
            Integrator::RungeKutta4 => rk4(x, t, dt, f),
        }
    }
}

/// Explicit midpoint rule.
pub fn midpoint<const N: usize, F>(x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    x + k2 * dt
}

/// Generic RK4 integrator for any state vector
///
/// Solves dx/dt = f(t, x) using 4th-order Runge-Kutta method.
pub fn rk4<const N: usize, F>(x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    let k3 = f(t + dt / 2.0, &(x + k2 * dt / 2.0));
    let k4 = f(t + dt, &(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Integrate `ṗ = v`, `v̇ = u(t)` over a uniform time grid.
///
/// # Arguments
/// * `times` - uniform time grid, at least two points
/// * `initial` - state `[p_x, p_y, v_x, v_y]` at `times[0]`
/// * `profile` - driving acceleration
/// * `integrator` - fixed-step scheme
///
/// # Returns
/// One state per time point; the first entry is `initial`.
pub fn generate_truth<P: ControlProfile + ?Sized>(
    times: &[f64],
    initial: Vector4<f64>,
    profile: &P,
    integrator: Integrator,
) -> Result<Vec<Vector4<f64>>> {
    let dt = step_interval(times)?;
    let dynamics = |t: f64, x: &Vector4<f64>| {
        let u = profile.control(t);
        Vector4::new(x[2], x[3], u.accel_x, u.accel_y)
    };
    let mut states = Vec::with_capacity(times.len());
    let mut state = initial;
    states.push(state);
    for &t in &times[..times.len() - 1] {
        state = integrator.step(&state, t, dt, &dynamics);
        states.push(state);
    }
    Ok(states)
}
