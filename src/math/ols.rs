//! Least squares solver.
//!
//! Two places in the fitter solve small linear systems:
//!
//! ```text
//! minimize Σ (y_i - init - sat * x_i)^2      x_i = c_i / (kd + c_i), kd fixed
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr               Levenberg–Marquardt step
//! ```
//!
//! The first is tall (n × 2), the second square (3 × 3). Both go through SVD so
//! near-singular systems (e.g. all concentrations saturating at a tiny kd) are
//! rejected cleanly instead of producing huge coefficients.
//! (Nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y ≈ a + b·x` by least squares, returning `(a, b)`.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut obs = DVector::<f64>::zeros(n);
    for i in 0..n {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = x[i];
        obs[i] = y[i];
    }
    let beta = solve_least_squares(&design, &obs)?;
    Some((beta[0], beta[1]))
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
    fn fit_line_recovers_intercept_and_slope() {
        let x = [0.1, 0.4, 0.7, 0.9];
        let y: Vec<f64> = x.iter().map(|v| -1.5 + 4.0 * v).collect();
        let (a, b) = fit_line(&x, &y).unwrap();
        assert!((a + 1.5).abs() < 1e-10);
        assert!((b - 4.0).abs() < 1e-10);
    }
}
