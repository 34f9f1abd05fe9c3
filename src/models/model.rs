//! Single-site saturation binding model.
//!
//! `response(c) = init + sat * c / (kd + c)` for `c >= 0`.
//!
//! The fitter relies on two primitive operations:
//! - predict the response for given parameters (residuals/plots)
//! - fill a Jacobian row of partial derivatives (Levenberg–Marquardt, covariance)

use crate::domain::BindingParams;

/// Fraction of receptors bound at concentration `c`: `c / (kd + c)`.
///
/// With `kd > 0` and `c >= 0` this is in `[0, 1)`.
pub fn occupancy(c: f64, kd: f64) -> f64 {
    let denom = kd + c;
    if denom == 0.0 { 0.0 } else { c / denom }
}

/// Predict the response at concentration `c`.
pub fn predict(params: &BindingParams, c: f64) -> f64 {
    params.init + params.sat * occupancy(c, params.kd)
}

/// Fill the Jacobian row `[∂/∂init, ∂/∂sat, ∂/∂kd]` at concentration `c`.
pub fn fill_jacobian_row(params: &BindingParams, c: f64, out: &mut [f64; 3]) {
    let denom = params.kd + c;
    out[0] = 1.0;
    if denom == 0.0 {
        out[1] = 0.0;
        out[2] = 0.0;
        return;
    }
    out[1] = c / denom;
    out[2] = -params.sat * c / (denom * denom);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_hits_half_max_at_kd() {
        let p = BindingParams {
            init: 100.0,
            sat: 1000.0,
            kd: 50.0,
        };
        assert!((predict(&p, 0.0) - 100.0).abs() < 1e-12);
        assert!((predict(&p, 50.0) - 600.0).abs() < 1e-12);
        assert!(predict(&p, 1e12) < 1100.0);
    }

    #[test]
    fn positive_amplitude_is_non_decreasing_in_concentration() {
        let p = BindingParams {
            init: -5.0,
            sat: 250.0,
            kd: 3.0,
        };
        let mut prev = predict(&p, 0.0);
        for i in 1..400 {
            let c = 10f64.powf(-3.0 + i as f64 * 0.02);
            let y = predict(&p, c);
            assert!(y >= prev, "decreased at c={c}: {y} < {prev}");
            prev = y;
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let p = BindingParams {
            init: 10.0,
            sat: 200.0,
            kd: 7.0,
        };
        let c = 4.0;
        let mut row = [0.0; 3];
        fill_jacobian_row(&p, c, &mut row);

        let h = 1e-6;
        let dk = (predict(&BindingParams { kd: p.kd + h, ..p }, c)
            - predict(&BindingParams { kd: p.kd - h, ..p }, c))
            / (2.0 * h);
        assert!((row[0] - 1.0).abs() < 1e-12);
        assert!((row[1] - c / (p.kd + c)).abs() < 1e-12);
        assert!((row[2] - dk).abs() < 1e-6);
    }
}
