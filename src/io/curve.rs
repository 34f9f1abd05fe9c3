//! Read/write fit JSON files.
//!
//! The fit file is the "portable" representation of a run:
//! - per titration: wells, medians, gate counts
//! - fitted parameters (or the fit error)
//! - a precomputed curve grid for quick plotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{BindingParams, CurveGrid, FitFile, TitrationRecord};
use crate::error::AppError;
use crate::models::predict;

pub const TOOL_NAME: &str = "kdfit";

/// Number of grid points stored per fitted curve.
pub const CURVE_GRID_POINTS: usize = 101;

pub fn build_fit_file(readout: &str, titrations: Vec<TitrationRecord>) -> FitFile {
    FitFile {
        tool: TOOL_NAME.to_string(),
        generated_at: Utc::now(),
        readout: readout.to_string(),
        titrations,
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, fit_file: &FitFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, fit_file)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    Ok(fit)
}

/// Sample the fitted curve log-uniformly across the positive concentrations.
///
/// The range is widened by half a decade on each side so the plateaus show.
pub fn build_curve_grid(params: &BindingParams, concentrations: &[f64], n: usize) -> CurveGrid {
    let n = n.max(2);
    let positive = concentrations.iter().copied().filter(|c| c.is_finite() && *c > 0.0);
    let (lo, hi) = positive.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c), hi.max(c)));

    let (mut l0, mut l1) = if lo.is_finite() && hi.is_finite() {
        (lo.log10() - 0.5, hi.log10() + 0.5)
    } else {
        // No positive concentrations: center on kd.
        let k = params.kd.max(f64::MIN_POSITIVE).log10();
        (k - 2.0, k + 2.0)
    };
    if l1 - l0 < 1e-9 {
        l0 -= 0.5;
        l1 += 0.5;
    }

    let mut concentration = Vec::with_capacity(n);
    let mut response = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let c = 10f64.powf(l0 + u * (l1 - l0));
        concentration.push(c);
        response.push(predict(params, c));
    }
    CurveGrid {
        concentration,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_spans_concentrations_log_uniformly() {
        let p = BindingParams {
            init: 0.0,
            sat: 1.0,
            kd: 10.0,
        };
        let g = build_curve_grid(&p, &[0.0, 1.0, 100.0], 5);
        assert_eq!(g.concentration.len(), 5);
        assert_relative_eq!(g.concentration[0], 10f64.powf(-0.5), max_relative = 1e-12);
        assert_relative_eq!(g.concentration[4], 10f64.powf(2.5), max_relative = 1e-12);
        assert_relative_eq!(g.concentration[2], 10.0, max_relative = 1e-12);
        assert_relative_eq!(g.response[2], 0.5, max_relative = 1e-12);
    }

    #[test]
    fn fit_file_round_trips_through_json() {
        let path = std::env::temp_dir().join(format!("kdfit-curve-{}.json", std::process::id()));
        let file = build_fit_file("PE-A", Vec::new());
        write_fit_json(&path, &file).unwrap();
        let back = read_fit_json(&path).unwrap();
        assert_eq!(back.tool, TOOL_NAME);
        assert_eq!(back.readout, "PE-A");
        assert_eq!(back.generated_at, file.generated_at);
        std::fs::remove_file(&path).unwrap();
    }
}
