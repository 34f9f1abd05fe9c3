//! Kd grid generation.
//!
//! For a fixed `kd` the binding model is linear in `(init, sat)`, so we seed the
//! nonlinear fit with a deterministic grid search over `kd`.
//!
//! Why grid search first?
//! - It avoids the local-minimum traps a single Levenberg–Marquardt start can fall into
//!   (e.g. a guess on the flat, saturated side of the curve).
//! - It is deterministic given the same inputs.
//! - A one-dimensional grid of a few dozen points is cheap.

use crate::error::FitError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(FitError::InvalidOptions(format!(
            "invalid kd range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(FitError::InvalidOptions("kd grid steps must be >= 2".to_string()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Keep both endpoints exact so a bound-hugging fit can land on them.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Smallest `kd` the fitter will consider.
///
/// `kd` lives in the open interval `(0, max_kd]`; in practice a kd three decades
/// below the lowest non-zero concentration is indistinguishable from a step.
pub fn kd_floor(concentrations: &[f64], max_kd: f64) -> f64 {
    let min_pos = concentrations
        .iter()
        .copied()
        .filter(|c| c.is_finite() && *c > 0.0)
        .fold(f64::INFINITY, f64::min);

    let from_data = if min_pos.is_finite() { min_pos * 1e-3 } else { max_kd * 1e-6 };
    from_data.min(max_kd * 1e-3).max(max_kd * 1e-12)
}

/// Log-spaced kd candidates over `[kd_floor, max_kd]`.
pub fn kd_grid(concentrations: &[f64], max_kd: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    log_space(kd_floor(concentrations, max_kd), max_kd, steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[v.len() - 1], 10.0);
        assert!(v.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn log_space_rejects_bad_ranges() {
        assert!(log_space(0.0, 1.0, 5).is_err());
        assert!(log_space(2.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 2.0, 1).is_err());
    }

    #[test]
    fn kd_floor_tracks_lowest_concentration() {
        let conc = [0.0, 0.5, 5.0, 50.0];
        let floor = kd_floor(&conc, 40_000.0);
        assert!((floor - 0.5e-3).abs() < 1e-15);
        assert!(floor > 0.0);
    }

    #[test]
    fn kd_floor_stays_below_tight_bound() {
        let conc = [10.0, 100.0, 1000.0];
        let floor = kd_floor(&conc, 1.0);
        assert!(floor < 1.0);
        let grid = kd_grid(&conc, 1.0, 10).unwrap();
        assert_eq!(grid.len(), 10);
        assert_eq!(*grid.last().unwrap(), 1.0);
    }
}
