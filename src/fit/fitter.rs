//! Bounded nonlinear least-squares fit of the single-site binding isotherm.
//!
//! Given:
//! - concentrations `c_i` (one per titration stop)
//! - responses `y_i` (gated fluorescence medians)
//! - initial guesses for `(init, sat, kd)` and an upper bound `max_kd`
//!
//! we:
//! 1. validate the series (lengths, finiteness, identifiability)
//! 2. grid-search `kd` (parallel); for each candidate `(init, sat)` is an OLS solve
//! 3. start from the better of the user guess and the best grid candidate
//! 4. refine all three parameters by bounded Levenberg–Marquardt
//! 5. report SSE (chi-square), standard errors and R²

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::{
    BindingFit, BindingParams, FitSettings, InitialGuess, StdErrors, DEFAULT_GRID_STEPS,
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_KD,
};
use crate::error::FitError;
use crate::fit::kd_grid::{kd_floor, kd_grid};
use crate::fit::levmar::{self, LmOptions};
use crate::math::{fit_line, mean, median, sum_sq_dev, variance};
use crate::models::occupancy;

/// Minimum number of points (and distinct concentrations) for a 3-parameter fit.
pub const MIN_POINTS: usize = 3;

/// Fitting options that affect how each titration is calibrated.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Upper bound on kd; kd is constrained to `(0, max_kd]`.
    pub max_kd: f64,
    /// Number of log-spaced kd grid candidates.
    pub grid_steps: usize,
    /// Iteration cap for the Levenberg–Marquardt refinement.
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_kd: DEFAULT_MAX_KD,
            grid_steps: DEFAULT_GRID_STEPS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl FitOptions {
    pub fn from_settings(settings: &FitSettings) -> Self {
        let d = Self::default();
        Self {
            max_kd: settings.max_kd.unwrap_or(d.max_kd),
            grid_steps: settings.grid_steps.unwrap_or(d.grid_steps),
            max_iterations: settings.max_iterations.unwrap_or(d.max_iterations),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    idx: usize,
    params: BindingParams,
    sse: f64,
}

/// Affine map of the responses onto zero mean and unit spread.
#[derive(Debug, Clone, Copy)]
struct ResponseScale {
    center: f64,
    spread: f64,
}

impl ResponseScale {
    /// Callers have rejected zero-variance responses, so `spread > 0`.
    fn of(resp: &[f64]) -> Self {
        let center = mean(resp).unwrap_or(0.0);
        let spread = (sum_sq_dev(resp) / resp.len() as f64).sqrt();
        Self {
            center,
            spread: if spread > 0.0 { spread } else { 1.0 },
        }
    }

    fn to_unit(&self, y: f64) -> f64 {
        (y - self.center) / self.spread
    }

    fn params_to_unit(&self, p: &BindingParams) -> BindingParams {
        BindingParams {
            init: self.to_unit(p.init),
            sat: p.sat / self.spread,
            kd: p.kd,
        }
    }

    fn params_from_unit(&self, p: &BindingParams) -> BindingParams {
        BindingParams {
            init: self.center + self.spread * p.init,
            sat: self.spread * p.sat,
            kd: p.kd,
        }
    }
}

/// Data-driven starting point: `init = min(y)`, `sat = max(y) - min(y)`,
/// `kd = median of the positive concentrations`.
pub fn auto_guess(conc: &[f64], resp: &[f64]) -> InitialGuess {
    let finite: Vec<f64> = resp.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let positive: Vec<f64> = conc.iter().copied().filter(|c| *c > 0.0).collect();

    let (init, sat) = if lo.is_finite() && hi.is_finite() {
        (lo, hi - lo)
    } else {
        (0.0, 1.0)
    };
    InitialGuess {
        init,
        sat,
        kd: median(&positive).unwrap_or(1.0),
    }
}

/// Resolve a guess from (optional) settings, filling gaps from the data.
pub fn guess_from_settings(settings: &FitSettings, conc: &[f64], resp: &[f64]) -> InitialGuess {
    let auto = auto_guess(conc, resp);
    InitialGuess {
        init: settings.init.unwrap_or(auto.init),
        sat: settings.sat.unwrap_or(auto.sat),
        kd: settings.kd.unwrap_or(auto.kd),
    }
}

/// Fit `init + sat * c / (kd + c)` to aligned concentration/response series.
pub fn fit_binding(
    conc: &[f64],
    resp: &[f64],
    guess: &InitialGuess,
    opts: &FitOptions,
) -> Result<BindingFit, FitError> {
    validate(conc, resp, guess, opts)?;

    let n = conc.len();
    let kd_lo = kd_floor(conc, opts.max_kd);
    let kd_hi = opts.max_kd;

    // Grid search and refinement run on standardized responses so the
    // stopping tests do not depend on the fluorescence scale.
    let scale = ResponseScale::of(resp);
    let unit_resp: Vec<f64> = resp.iter().map(|&y| scale.to_unit(y)).collect();

    let grid = kd_grid(conc, opts.max_kd, opts.grid_steps)?;
    let grid_best = best_grid_candidate(&grid, conc, &unit_resp);

    let mut user_start = scale.params_to_unit(&BindingParams::from(*guess));
    if user_start.kd < kd_lo || user_start.kd > kd_hi {
        log::warn!(
            "kd guess {} outside [{kd_lo:.3e}, {kd_hi}]; clamping",
            user_start.kd
        );
        user_start.kd = user_start.kd.clamp(kd_lo, kd_hi);
    }
    let user_sse = levmar::sse(&user_start, conc, &unit_resp);

    let start = match grid_best {
        Some(c) if !(user_sse.is_finite() && user_sse <= c.sse) => {
            log::debug!(
                "starting from grid candidate #{} kd={:.4} (sse={:.4e})",
                c.idx,
                c.params.kd,
                c.sse
            );
            c.params
        }
        _ => user_start,
    };

    let lm_opts = LmOptions {
        max_iterations: opts.max_iterations,
        ..LmOptions::default()
    };
    let outcome = levmar::refine(conc, &unit_resp, start, kd_lo, kd_hi, &lm_opts)?;
    let params = scale.params_from_unit(&outcome.params);

    if !(params.init.is_finite() && params.sat.is_finite() && params.kd.is_finite()) {
        return Err(FitError::NumericalFailure(
            "non-finite parameters after refinement".to_string(),
        ));
    }

    let chisqr = levmar::sse(&params, conc, resp);
    let dof = n - MIN_POINTS;
    let redchi = if dof > 0 { Some(chisqr / dof as f64) } else { None };
    let stderr = standard_errors(&params, conc, redchi);
    let r_squared = r_squared(resp, chisqr, redchi);

    Ok(BindingFit {
        params,
        stderr,
        chisqr,
        redchi,
        r_squared,
        n_points: n,
        iterations: outcome.iterations,
        kd_at_bound: params.kd >= kd_hi * (1.0 - 1e-9),
    })
}

fn validate(conc: &[f64], resp: &[f64], guess: &InitialGuess, opts: &FitOptions) -> Result<(), FitError> {
    if conc.len() != resp.len() {
        return Err(FitError::MismatchedInputs {
            conc_len: conc.len(),
            resp_len: resp.len(),
        });
    }
    if conc.len() < MIN_POINTS {
        return Err(FitError::TooFewPoints {
            got: conc.len(),
            min: MIN_POINTS,
        });
    }
    if !(opts.max_kd.is_finite() && opts.max_kd > 0.0) {
        return Err(FitError::InvalidBounds { max_kd: opts.max_kd });
    }
    if opts.max_iterations == 0 {
        return Err(FitError::InvalidOptions("max_iterations must be >= 1".to_string()));
    }
    for (index, &value) in conc.iter().enumerate() {
        if !(value.is_finite() && value >= 0.0) {
            return Err(FitError::InvalidConcentration { index, value });
        }
    }
    if let Some(index) = resp.iter().position(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteResponse { index });
    }
    for (name, value) in [("init", guess.init), ("sat", guess.sat), ("kd", guess.kd)] {
        if !value.is_finite() {
            return Err(FitError::InvalidGuess { name, value });
        }
    }

    let mut sorted = conc.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup();
    if sorted.len() < MIN_POINTS {
        return Err(FitError::DegenerateConcentrations {
            distinct: sorted.len(),
            min: MIN_POINTS,
        });
    }

    if sum_sq_dev(resp) <= 0.0 {
        return Err(FitError::ZeroVariance);
    }
    Ok(())
}

fn best_grid_candidate(grid: &[f64], conc: &[f64], resp: &[f64]) -> Option<Candidate> {
    // Evaluate each kd independently (parallel).
    let candidates: Vec<Candidate> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &kd)| evaluate_candidate(kd, conc, resp).map(|(params, sse)| Candidate { idx, params, sse }))
        .collect();

    // Deterministic selection: pick the minimum SSE; break ties by original grid index.
    let mut iter = candidates.iter();
    let mut best = *iter.next()?;
    for c in iter {
        if c.sse < best.sse || (c.sse == best.sse && c.idx < best.idx) {
            best = *c;
        }
    }
    Some(best)
}

/// With kd fixed the model is `init + sat * x` with `x = c / (kd + c)`.
fn evaluate_candidate(kd: f64, conc: &[f64], resp: &[f64]) -> Option<(BindingParams, f64)> {
    let x: Vec<f64> = conc.iter().map(|&c| occupancy(c, kd)).collect();
    let (init, sat) = fit_line(&x, resp)?;
    let params = BindingParams { init, sat, kd };
    let sse = levmar::sse(&params, conc, resp);
    if sse.is_finite() { Some((params, sse)) } else { None }
}

/// Scaled covariance `(JᵀJ)⁻¹ · redchi`; standard errors are the root diagonal.
fn standard_errors(params: &BindingParams, conc: &[f64], redchi: Option<f64>) -> StdErrors {
    let Some(redchi) = redchi else {
        return StdErrors::default();
    };
    let j: DMatrix<f64> = levmar::jacobian(params, conc);
    let jtj = j.transpose() * &j;
    let Some(inv) = jtj.try_inverse() else {
        return StdErrors::default();
    };

    let se = |k: usize| {
        let v = inv[(k, k)] * redchi;
        if v.is_finite() && v >= 0.0 { Some(v.sqrt()) } else { None }
    };
    StdErrors {
        init: se(0),
        sat: se(1),
        kd: se(2),
    }
}

/// Degrees-of-freedom adjusted R²: `1 - redchi / var(y, ddof=2)`.
///
/// With no residual degrees of freedom the plain `1 - SSE / SS_tot` is used.
fn r_squared(resp: &[f64], chisqr: f64, redchi: Option<f64>) -> f64 {
    match (redchi, variance(resp, 2)) {
        (Some(rc), Some(var)) if var > 0.0 => 1.0 - rc / var,
        _ => {
            let ss_tot = sum_sq_dev(resp);
            if ss_tot > 0.0 { 1.0 - chisqr / ss_tot } else { f64::NAN }
        }
    }
}
