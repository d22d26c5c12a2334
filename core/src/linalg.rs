//! Linear algebra helpers for the filter recursions and the least-squares fit.
//!
//! Public API:
//!     pub fn checked_inverse(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>>
//!     pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64>
//!     pub fn asymmetry(m: &DMatrix<f64>) -> f64
//!     pub fn is_positive_semi_definite(m: &DMatrix<f64>, tolerance: f64) -> bool
//!     pub fn polynomial_fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<DVector<f64>>
//!
//! The Kalman gain is computed with an explicit inverse of the innovation
//! covariance. `checked_inverse` is the single place that decides whether a
//! matrix is invertible "enough":
//! 1) square
//! 2) LU inverse exists
//! 3) every entry of the inverse is finite
//! 4) condition estimate ‖A‖_F · ‖A⁻¹‖_F stays below [`MAX_CONDITION`]

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};

use crate::error::{EstimationError, Result};

/// Largest accepted condition estimate before a matrix is treated as singular.
pub const MAX_CONDITION: f64 = 1e12;

/// Explicit inverse with singularity detection.
///
/// # Arguments
/// * `matrix` - square matrix to invert
///
/// # Returns
/// * `Some(inverse)` when the matrix is numerically invertible.
/// * `None` when the matrix is not square, is singular, produces non-finite
///   entries, or is too ill-conditioned to trust.
pub fn checked_inverse(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !matrix.is_square() || matrix.nrows() == 0 {
        return None;
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let inverse = matrix.clone().try_inverse()?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if condition_estimate(matrix, &inverse) > MAX_CONDITION {
        return None;
    }
    Some(inverse)
}
/// Frobenius-norm condition estimate ‖A‖_F · ‖A⁻¹‖_F.
///
/// Cheap upper bound on the 2-norm condition number (times at most `n`), good
/// enough to reject matrices whose inverse is dominated by round-off.
#[inline]
pub fn condition_estimate(matrix: &DMatrix<f64>, inverse: &DMatrix<f64>) -> f64 {
    matrix.norm() * inverse.norm()
}
/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Simple matrix symmetrization function that reduces round-off errors associated
/// with floating point arithmetic.
///
/// # Arguments
/// * `m` - the matrix to symmetrize
///
/// # Returns
/// A symmetrized version of the input matrix.
#[inline]
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}
/// Frobenius norm of the antisymmetric part, ‖P − Pᵀ‖_F.
#[inline]
pub fn asymmetry(m: &DMatrix<f64>) -> f64 {
    (m - m.transpose()).norm()
}
/// Smallest entry on the main diagonal (`+inf` for an empty matrix).
pub fn min_diagonal(m: &DMatrix<f64>) -> f64 {
    m.diagonal().iter().cloned().fold(f64::INFINITY, f64::min)
}
/// Positive-semi-definiteness test on the symmetric part of `m`.
///
/// Eigenvalues down to `-tolerance` are accepted to absorb round-off.
pub fn is_positive_semi_definite(m: &DMatrix<f64>, tolerance: f64) -> bool {
    if !m.is_square() {
        return false;
    }
    if m.nrows() == 0 {
        return true;
    }
    let se = SymmetricEigen::new(symmetrize(m));
    se.eigenvalues.iter().all(|&l| l >= -tolerance)
}

/// Design matrix for a polynomial of the given degree, highest power first:
/// row i = [x_iᵈ, …, x_i, 1].
pub fn vandermonde(xs: &[f64], degree: usize) -> DMatrix<f64> {
    DMatrix::from_fn(xs.len(), degree + 1, |i, j| xs[i].powi((degree - j) as i32))
}
/// Least-squares polynomial coefficients through the normal equations
/// c = (AᵀA)⁻¹ Aᵀ y, highest power first.
///
/// # Arguments
/// * `xs` - abscissae
/// * `ys` - ordinates, same length as `xs`
/// * `degree` - polynomial degree
///
/// # Returns
/// * `Ok(coefficients)` with `degree + 1` entries.
/// * `Err(InvalidInput)` on mismatched lengths, too few samples, or when AᵀA
///   cannot be inverted (e.g. all abscissae identical).
pub fn polynomial_fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<DVector<f64>> {
    if xs.len() != ys.len() {
        return Err(EstimationError::invalid(format!(
            "polynomial fit needs matching samples, got {} abscissae and {} ordinates",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() <= degree {
        return Err(EstimationError::invalid(format!(
            "polynomial fit of degree {} needs at least {} samples, got {}",
            degree,
            degree + 1,
            xs.len()
        )));
    }
    let a = vandermonde(xs, degree);
    let ata = a.transpose() * &a;
    let ata_inv = checked_inverse(&ata).ok_or_else(|| {
        EstimationError::invalid("normal equations are singular for the given abscissae")
    })?;
    let b = DVector::from_column_slice(ys);
    Ok(ata_inv * (a.transpose() * b))
}
/// Quadratic fit `y ≈ c0·x² + c1·x + c2`.
pub fn fit_quadratic(xs: &[f64], ys: &[f64]) -> Result<DVector<f64>> {
    polynomial_fit(xs, ys, 2)
}
/// Evaluate a polynomial with coefficients ordered highest power first (Horner).
pub fn evaluate_polynomial(coefficients: &DVector<f64>, x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, c| acc * x + c)
}

/* =============================== Tests ==================================== */

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn approx_eq(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) -> bool {
        if a.shape() != b.shape() {
            return false;
        }
        let mut max_abs = 0.0f64;
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                max_abs = max_abs.max((a[(i, j)] - b[(i, j)]).abs());
            }
        }
        max_abs <= tol
    }

    #[test]
    fn t_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 3.0]);
        let s = symmetrize(&m);
        let s_expected = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 3.0]);
        assert!(approx_eq(&s, &s_expected, 1e-15));
        assert_approx_eq!(asymmetry(&s), 0.0, 1e-15);
    }

    #[test]
    fn t_asymmetry() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 3.0]);
        // antisymmetric part has entries ±2
        assert_approx_eq!(asymmetry(&m), 8.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn t_checked_inverse_identity() {
        let i = DMatrix::<f64>::identity(3, 3);
        let inv = checked_inverse(&i).expect("identity is invertible");
        assert!(approx_eq(&inv, &i, 1e-15));
    }

    #[test]
    fn t_checked_inverse_general() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 7.0, 2.0, 6.0]);
        let inv = checked_inverse(&a).expect("matrix is invertible");
        let expected = DMatrix::from_row_slice(2, 2, &[0.6, -0.7, -0.2, 0.4]);
        assert!(approx_eq(&inv, &expected, 1e-12));
        assert!(approx_eq(&(&a * &inv), &DMatrix::identity(2, 2), 1e-12));
    }

    #[test]
    fn t_checked_inverse_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(checked_inverse(&a).is_none());
        assert!(checked_inverse(&DMatrix::<f64>::zeros(2, 2)).is_none());
    }

    #[test]
    fn t_checked_inverse_ill_conditioned() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1e-14]);
        assert!(checked_inverse(&a).is_none());
    }

    #[test]
    fn t_checked_inverse_small_but_well_conditioned() {
        // tiny scale is fine as long as the conditioning is good
        let a = DMatrix::<f64>::identity(2, 2) * 1e-12;
        let inv = checked_inverse(&a).expect("scaled identity is invertible");
        assert_approx_eq!(inv[(0, 0)], 1e12, 1.0);
    }

    #[test]
    fn t_checked_inverse_rejects_non_square_and_nan() {
        assert!(checked_inverse(&DMatrix::<f64>::zeros(2, 3)).is_none());
        let a = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, 0.0, 1.0]);
        assert!(checked_inverse(&a).is_none());
    }

    #[test]
    fn t_min_diagonal() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 9.0, 9.0, 9.0, -0.5, 9.0, 9.0, 9.0, 2.0]);
        assert_approx_eq!(min_diagonal(&a), -0.5);
    }

    #[test]
    fn t_positive_semi_definite() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.5, 0.0, 1.0, -1.0, 0.0, 0.0, 0.2]);
        let p = &a * a.transpose();
        assert!(is_positive_semi_definite(&p, 1e-12));
        // rank-deficient but still PSD
        let v = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        assert!(is_positive_semi_definite(&(&v * v.transpose()), 1e-9));
        // eigenvalues {3, -1}
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(!is_positive_semi_definite(&m, 1e-12));
    }

    #[test]
    fn t_vandermonde() {
        let a = vandermonde(&[2.0, 3.0], 2);
        let expected = DMatrix::from_row_slice(2, 3, &[4.0, 2.0, 1.0, 9.0, 3.0, 1.0]);
        assert!(approx_eq(&a, &expected, 1e-15));
    }

    #[test]
    fn t_fit_quadratic_exact() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25 - 2.0).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x * x - 2.0 * x + 0.5).collect();
        let c = fit_quadratic(&xs, &ys).expect("fit should succeed");
        assert_eq!(c.len(), 3);
        assert_approx_eq!(c[0], 3.0, 1e-9);
        assert_approx_eq!(c[1], -2.0, 1e-9);
        assert_approx_eq!(c[2], 0.5, 1e-9);
        assert_approx_eq!(evaluate_polynomial(&c, 1.5), 3.0 * 2.25 - 3.0 + 0.5, 1e-9);
    }

    #[test]
    fn t_fit_linear_least_squares() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.1, 0.9, 2.1, 2.9];
        let c = polynomial_fit(&xs, &ys, 1).expect("fit should succeed");
        // slope = Sxy / Sxx = 4.8 / 5.0, intercept = 1.5 - slope * 1.5
        assert_approx_eq!(c[0], 0.96, 1e-9);
        assert_approx_eq!(c[1], 0.06, 1e-9);
    }

    #[test]
    fn t_fit_rejects_bad_input() {
        assert!(matches!(
            polynomial_fit(&[0.0, 1.0], &[0.0], 1),
            Err(EstimationError::InvalidInput(_))
        ));
        assert!(matches!(
            fit_quadratic(&[0.0, 1.0], &[0.0, 1.0]),
            Err(EstimationError::InvalidInput(_))
        ));
        assert!(matches!(
            fit_quadratic(&[1.0, 1.0, 1.0, 1.0], &[0.0, 1.0, 2.0, 3.0]),
            Err(EstimationError::InvalidInput(_))
        ));
    }
}
