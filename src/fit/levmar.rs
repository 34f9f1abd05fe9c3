//! Bounded Levenberg–Marquardt refinement of the binding parameters.
//!
//! The optimizer works on `θ = (init, sat, ln kd)`:
//! - `ln kd` keeps `kd` strictly positive and evens out the curvature between
//!   nM and µM affinities
//! - after every trial step `ln kd` is projected back into `[ln kd_lo, ln kd_hi]`
//!
//! Each iteration solves `(JᵀJ + λ·D) δ = Jᵀr` with `D = diag(JᵀJ)`, accepts the
//! step when the SSE drops (and relaxes λ), otherwise raises λ and retries.
//!
//! Convergence (any of):
//! - accepted step with relative SSE decrease `<= ftol`
//! - accepted step with relative parameter change `<= xtol`
//! - SSE numerically zero relative to the total sum of squares
//! - λ exceeds `LAMBDA_MAX` (no descent direction left inside the bounds)

use nalgebra::{DMatrix, DVector, Matrix3};

use crate::domain::BindingParams;
use crate::error::FitError;
use crate::math::{solve_least_squares, sum_sq_dev};
use crate::models::{fill_jacobian_row, predict};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const LAMBDA_MIN: f64 = 1e-15;
const SSE_FLOOR: f64 = 1e-28;
const BOUND_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: crate::domain::DEFAULT_MAX_ITERATIONS,
            ftol: 1e-12,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LmOutcome {
    pub params: BindingParams,
    pub sse: f64,
    pub iterations: usize,
}

/// Sum of squared residuals.
pub fn sse(params: &BindingParams, conc: &[f64], resp: &[f64]) -> f64 {
    conc.iter()
        .zip(resp.iter())
        .map(|(&c, &y)| {
            let r = y - predict(params, c);
            r * r
        })
        .sum()
}

/// Jacobian of the model with respect to `(init, sat, kd)`, one row per point.
pub fn jacobian(params: &BindingParams, conc: &[f64]) -> DMatrix<f64> {
    let mut j = DMatrix::<f64>::zeros(conc.len(), 3);
    let mut row = [0.0; 3];
    for (i, &c) in conc.iter().enumerate() {
        fill_jacobian_row(params, c, &mut row);
        for k in 0..3 {
            j[(i, k)] = row[k];
        }
    }
    j
}

/// Refine `start` by bounded Levenberg–Marquardt.
pub fn refine(
    conc: &[f64],
    resp: &[f64],
    start: BindingParams,
    kd_lo: f64,
    kd_hi: f64,
    opts: &LmOptions,
) -> Result<LmOutcome, FitError> {
    let ln_lo = kd_lo.ln();
    let ln_hi = kd_hi.ln();
    let sse_floor = SSE_FLOOR * (1.0 + sum_sq_dev(resp));

    let mut theta = [start.init, start.sat, start.kd.clamp(kd_lo, kd_hi).ln()];
    let mut current = to_params(&theta, kd_lo, kd_hi);
    let mut current_sse = sse(&current, conc, resp);
    if !current_sse.is_finite() {
        return Err(FitError::NumericalFailure(
            "non-finite SSE at the starting point".to_string(),
        ));
    }
    if current_sse <= sse_floor {
        return Ok(LmOutcome {
            params: current,
            sse: current_sse,
            iterations: 0,
        });
    }

    let mut lambda = LAMBDA_INIT;
    for iter in 1..=opts.max_iterations {
        let (a, g) = normal_equations(&current, conc, resp);
        let damping = damping_diag(&a);

        let at_bound_step = |d2: f64| {
            (theta[2] >= ln_hi - BOUND_EPS && d2 > 0.0) || (theta[2] <= ln_lo + BOUND_EPS && d2 < 0.0)
        };
        let step = solve_step(&a, &g, &damping, lambda, false).and_then(|delta| {
            if at_bound_step(delta[2]) {
                // kd is pinned to an active bound; move init/sat only.
                solve_step(&a, &g, &damping, lambda, true)
            } else {
                Some(delta)
            }
        });

        let accepted = match step {
            Some(delta) => {
                let trial_theta = [
                    theta[0] + delta[0],
                    theta[1] + delta[1],
                    (theta[2] + delta[2]).clamp(ln_lo, ln_hi),
                ];
                let trial = to_params(&trial_theta, kd_lo, kd_hi);
                let trial_sse = sse(&trial, conc, resp);

                if trial_sse.is_finite() && trial_sse < current_sse {
                    let sse_drop = current_sse - trial_sse;
                    let small_step = (0..3).all(|k| {
                        (trial_theta[k] - theta[k]).abs() <= opts.xtol * (theta[k].abs() + opts.xtol)
                    });

                    theta = trial_theta;
                    current = trial;
                    let prev_sse = current_sse;
                    current_sse = trial_sse;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);

                    log::trace!("lm iter {iter}: sse={current_sse:.6e} lambda={lambda:.1e}");

                    if sse_drop <= opts.ftol * prev_sse || small_step || current_sse <= sse_floor {
                        return Ok(LmOutcome {
                            params: current,
                            sse: current_sse,
                            iterations: iter,
                        });
                    }
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !accepted {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return Ok(LmOutcome {
                    params: current,
                    sse: current_sse,
                    iterations: iter,
                });
            }
        }
    }

    Err(FitError::NotConverged {
        iterations: opts.max_iterations,
        sse: current_sse,
    })
}

/// `exp(ln kd)` does not round-trip exactly, so kd is clamped again in kd space.
fn to_params(theta: &[f64; 3], kd_lo: f64, kd_hi: f64) -> BindingParams {
    BindingParams {
        init: theta[0],
        sat: theta[1],
        kd: theta[2].exp().clamp(kd_lo, kd_hi),
    }
}

/// `JᵀJ` and `Jᵀr` in `(init, sat, ln kd)` coordinates.
fn normal_equations(params: &BindingParams, conc: &[f64], resp: &[f64]) -> (Matrix3<f64>, [f64; 3]) {
    let mut a = Matrix3::<f64>::zeros();
    let mut g = [0.0; 3];
    let mut row = [0.0; 3];
    for (&c, &y) in conc.iter().zip(resp.iter()) {
        fill_jacobian_row(params, c, &mut row);
        // Chain rule: ∂f/∂(ln kd) = kd · ∂f/∂kd.
        row[2] *= params.kd;
        let r = y - predict(params, c);
        for i in 0..3 {
            g[i] += row[i] * r;
            for k in 0..3 {
                a[(i, k)] += row[i] * row[k];
            }
        }
    }
    (a, g)
}

/// Solve the damped normal equations; with `freeze_kd` the kd step is forced to zero.
fn solve_step(
    a: &Matrix3<f64>,
    g: &[f64; 3],
    damping: &[f64; 3],
    lambda: f64,
    freeze_kd: bool,
) -> Option<[f64; 3]> {
    let mut lhs = *a;
    for k in 0..3 {
        lhs[(k, k)] += lambda * damping[k];
    }
    let mut rhs = *g;
    if freeze_kd {
        for k in 0..3 {
            lhs[(2, k)] = 0.0;
            lhs[(k, 2)] = 0.0;
        }
        lhs[(2, 2)] = 1.0;
        rhs[2] = 0.0;
    }
    let lhs = DMatrix::from_column_slice(3, 3, lhs.as_slice());
    let rhs = DVector::from_column_slice(&rhs);
    let delta = solve_least_squares(&lhs, &rhs)?;
    Some([delta[0], delta[1], delta[2]])
}

fn damping_diag(a: &Matrix3<f64>) -> [f64; 3] {
    let max_diag = (0..3).map(|k| a[(k, k)]).fold(0.0_f64, f64::max);
    let floor = if max_diag > 0.0 { max_diag * 1e-12 } else { 1.0 };
    [
        a[(0, 0)].max(floor),
        a[(1, 1)].max(floor),
        a[(2, 2)].max(floor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(params: &BindingParams, conc: &[f64]) -> Vec<f64> {
        conc.iter().map(|&c| predict(params, c)).collect()
    }

    #[test]
    fn refine_recovers_exact_parameters_from_nearby_start() {
        let truth = BindingParams {
            init: 120.0,
            sat: 3_000.0,
            kd: 25.0,
        };
        let conc = [0.0, 1.0, 3.0, 10.0, 30.0, 100.0, 300.0, 1000.0];
        let resp = synthetic(&truth, &conc);

        let start = BindingParams {
            init: 100.0,
            sat: 2_500.0,
            kd: 40.0,
        };
        let out = refine(&conc, &resp, start, 1e-3, 40_000.0, &LmOptions::default()).unwrap();
        assert!((out.params.kd - truth.kd).abs() / truth.kd < 1e-6);
        assert!((out.params.sat - truth.sat).abs() / truth.sat < 1e-6);
        assert!((out.params.init - truth.init).abs() < 1e-4);
    }

    #[test]
    fn refine_respects_upper_bound() {
        // Nearly linear data wants an enormous kd; the bound must hold.
        let conc = [0.0, 1.0, 2.0, 4.0, 8.0];
        let resp = [0.0, 1.0, 2.0, 4.0, 8.0];
        let start = BindingParams {
            init: 0.0,
            sat: 50.0,
            kd: 40.0,
        };
        let out = refine(&conc, &resp, start, 1e-3, 50.0, &LmOptions::default()).unwrap();
        assert!(out.params.kd <= 50.0 * (1.0 + 1e-12));
        assert!(out.params.kd > 0.0);
    }

    #[test]
    fn bound_hugging_kd_never_exceeds_the_bound() {
        let conc = [0.0, 1.0, 2.0, 4.0, 8.0, 16.0];
        let resp: Vec<f64> = conc.iter().map(|c| 10.0 + 3.0 * c).collect();
        for kd_hi in [100.0, 1234.5, 7.0] {
            let start = BindingParams {
                init: 10.0,
                sat: 3.0 * kd_hi,
                kd: kd_hi,
            };
            let out = refine(&conc, &resp, start, 1e-3, kd_hi, &LmOptions::default()).unwrap();
            assert!(out.params.kd <= kd_hi, "kd={:e} kd_hi={kd_hi}", out.params.kd);
        }
    }

    #[test]
    fn jacobian_has_one_row_per_point() {
        let p = BindingParams {
            init: 1.0,
            sat: 2.0,
            kd: 3.0,
        };
        let j = jacobian(&p, &[0.0, 1.0, 2.0]);
        assert_eq!(j.nrows(), 3);
        assert_eq!(j.ncols(), 3);
        assert_eq!(j[(0, 1)], 0.0);
    }
}
