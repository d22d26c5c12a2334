//! Error type shared by the estimators, the step loops and the file layer.
use std::io;

use thiserror::Error;

/// Errors raised while building, running or persisting an estimation run.
///
/// The numerical variants carry the zero-based step index at which the
/// failure was detected together with the name of the offending quantity,
/// so a caller can report exactly where a run went wrong.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("numerical instability at step {step}: {quantity} is singular or ill-conditioned")]
    NumericalInstability { step: usize, quantity: String },
    #[error("invariant violated at step {step}: {quantity} {detail}")]
    InvariantViolation {
        step: usize,
        quantity: String,
        detail: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EstimationError {
    /// Step index the failure is attached to, if it is a per-step failure.
    pub fn step(&self) -> Option<usize> {
        match self {
            EstimationError::NumericalInstability { step, .. }
            | EstimationError::InvariantViolation { step, .. } => Some(*step),
            _ => None,
        }
    }
    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        EstimationError::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EstimationError>;
