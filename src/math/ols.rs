//! Small dense linear solves.
//!
//! The optimiser repeatedly solves tiny systems of the form
//!
//! ```text
//! (H + λ·diag(H)) δ = -g
//! ```
//!
//! where the dimension is the number of free spectral parameters (1-8).
//!
//! Implementation choices:
//! - SVD is used so that near-singular Hessians (degenerate parameters, empty
//!   bins) degrade gracefully instead of panicking.
//! - Performance is irrelevant at this size.

use nalgebra::{DMatrix, DVector};

/// Solve a (possibly rectangular) least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Invert a symmetric positive-definite matrix.
///
/// Returns `None` when the matrix is not positive definite or the inverse
/// has non-positive diagonal entries.
pub fn invert_spd(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = m.clone().cholesky()?;
    let inv = chol.inverse();
    let ok = (0..inv.nrows()).all(|i| inv[(i, i)].is_finite() && inv[(i, i)] > 0.0)
        && inv.iter().all(|v| v.is_finite());
    ok.then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn invert_spd_rejects_indefinite() {
        let good = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = invert_spd(&good).unwrap();
        let id = &good * &inv;
        assert!((id[(0, 0)] - 1.0).abs() < 1e-12 && id[(0, 1)].abs() < 1e-12);

        let bad = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(invert_spd(&bad).is_none());
    }
}
