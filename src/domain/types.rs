//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during gating and fitting
//! - read from the experiment manifest (JSON)
//! - exported to JSON/CSV and reloaded later for plotting

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gating::Gate;

/// Default upper bound on Kd (same units as the concentration series).
pub const DEFAULT_MAX_KD: f64 = 40_000.0;

/// Default number of log-spaced Kd candidates in the grid search.
pub const DEFAULT_GRID_STEPS: usize = 60;

/// Default iteration cap for the Levenberg–Marquardt refinement.
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Gate vertices and plot bounds snap to multiples of this value.
pub const ROUND_INTERVAL: f64 = 5.0;

/// Hyperlog `b` parameter used by the standard scatter/fluorescence transform.
pub const DEFAULT_HLOG_B: f64 = 100.0;

/// Channels transformed by the standard hyperlog transform.
pub const DEFAULT_TRANSFORM_CHANNELS: [&str; 5] =
    ["FSC-H", "SSC-H", "SSC-W", "Alexa Fluor 680-A", "PE-A"];

/// Default readout (binding) channel.
pub const DEFAULT_READOUT: &str = "PE-A";

/// Single-site binding parameters: `init + sat * c / (kd + c)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindingParams {
    /// Baseline response at zero concentration.
    pub init: f64,
    /// Amplitude above baseline at saturation.
    pub sat: f64,
    /// Dissociation constant.
    pub kd: f64,
}

/// Starting point for the fitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub init: f64,
    pub sat: f64,
    pub kd: f64,
}

impl From<InitialGuess> for BindingParams {
    fn from(g: InitialGuess) -> Self {
        Self {
            init: g.init,
            sat: g.sat,
            kd: g.kd,
        }
    }
}

/// One-sigma standard errors from the scaled covariance matrix.
///
/// Absent when there are no residual degrees of freedom or the normal matrix is singular.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StdErrors {
    pub init: Option<f64>,
    pub sat: Option<f64>,
    pub kd: Option<f64>,
}

/// Fit output for a single titration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingFit {
    pub params: BindingParams,
    pub stderr: StdErrors,
    /// Sum of squared residuals.
    pub chisqr: f64,
    /// `chisqr / (n - 3)`; absent when `n == 3`.
    pub redchi: Option<f64>,
    pub r_squared: f64,
    pub n_points: usize,
    pub iterations: usize,
    /// `true` when the fitted Kd sits on the upper bound.
    pub kd_at_bound: bool,
}

/// One concentration stop of a titration, i.e. one well.
///
/// The well's events live in a file whose name starts with
/// `Specimen_<specimen:03>_<letter><number>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TitrationStop {
    pub specimen: u32,
    pub letter: char,
    pub number: u32,
}

impl TitrationStop {
    /// File-name prefix identifying this well.
    pub fn file_prefix(&self) -> String {
        format!("Specimen_{:03}_{}{}", self.specimen, self.letter, self.number)
    }

    /// Short well label, e.g. `A2`.
    pub fn well_id(&self) -> String {
        format!("{}{}", self.letter, self.number)
    }
}

impl fmt::Display for TitrationStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_prefix())
    }
}

/// Events remaining after one gate of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCount {
    pub gate: String,
    pub remaining: usize,
}

/// Per-well outcome of the gate → filter → median reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellSummary {
    pub stop: TitrationStop,
    pub concentration: f64,
    pub total_events: usize,
    pub gate_counts: Vec<GateCount>,
    /// Median of the readout channel over surviving events.
    pub median: Option<f64>,
}

impl WellSummary {
    /// Events surviving the final gate.
    pub fn gated_events(&self) -> usize {
        self.gate_counts
            .last()
            .map(|c| c.remaining)
            .unwrap_or(self.total_events)
    }
}

/// Fitted curve sampled for plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub concentration: Vec<f64>,
    pub response: Vec<f64>,
}

/// Everything computed for one titration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitrationRecord {
    pub name: String,
    pub wells: Vec<WellSummary>,
    pub fit: Option<BindingFit>,
    /// Fit failure message when `fit` is absent.
    pub error: Option<String>,
    pub grid: Option<CurveGrid>,
}

impl TitrationRecord {
    pub fn concentrations(&self) -> Vec<f64> {
        self.wells.iter().map(|w| w.concentration).collect()
    }

    /// Medians aligned with `concentrations()`; wells without a median are `NaN`.
    pub fn medians(&self) -> Vec<f64> {
        self.wells.iter().map(|w| w.median.unwrap_or(f64::NAN)).collect()
    }
}

/// A saved fit file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub readout: String,
    pub titrations: Vec<TitrationRecord>,
}

/// Well layout of a titration; each list has length 1 (broadcast) or C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLayout {
    pub specimens: Vec<u32>,
    /// One letter per stop, e.g. `"A"` or `"ABCD"`.
    pub letters: String,
    pub numbers: Vec<u32>,
}

/// Fit settings; every field is optional so manifests can layer overrides.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub max_kd: Option<f64>,
    pub init: Option<f64>,
    pub sat: Option<f64>,
    pub kd: Option<f64>,
    pub grid_steps: Option<usize>,
    pub max_iterations: Option<usize>,
}

impl FitSettings {
    /// Fields set in `other` win over fields set in `self`.
    pub fn overlay(self, other: &FitSettings) -> FitSettings {
        FitSettings {
            max_kd: other.max_kd.or(self.max_kd),
            init: other.init.or(self.init),
            sat: other.sat.or(self.sat),
            kd: other.kd.or(self.kd),
            grid_steps: other.grid_steps.or(self.grid_steps),
            max_iterations: other.max_iterations.or(self.max_iterations),
        }
    }
}

/// Hyperlog transform applied to events before gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default = "default_transform_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_hlog_b")]
    pub b: f64,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            channels: default_transform_channels(),
            b: DEFAULT_HLOG_B,
        }
    }
}

fn default_transform_channels() -> Vec<String> {
    DEFAULT_TRANSFORM_CHANNELS.iter().map(|s| s.to_string()).collect()
}

fn default_hlog_b() -> f64 {
    DEFAULT_HLOG_B
}

fn default_readout() -> String {
    DEFAULT_READOUT.to_string()
}

/// One titration of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitrationSpec {
    pub name: String,
    pub layout: StopLayout,
    /// One concentration per stop, in the same order as the layout.
    pub concentrations: Vec<f64>,
    #[serde(default)]
    pub fit: FitSettings,
}

/// Experiment manifest (JSON): data location, gates, and titrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentManifest {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_readout")]
    pub readout: String,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default)]
    pub gates: Vec<Gate>,
    /// Wells with fewer gated events than this produce no median.
    #[serde(default)]
    pub min_events: usize,
    #[serde(default)]
    pub fit: FitSettings,
    pub titrations: Vec<TitrationSpec>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus `.env` defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub manifest_path: PathBuf,
    /// Overrides the manifest's `data_dir`.
    pub data_dir: Option<PathBuf>,
    /// Used when neither the CLI nor the manifest names a data directory.
    pub default_data_dir: Option<PathBuf>,
    /// Overrides manifest fit settings for every titration.
    pub fit_overrides: FitSettings,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_medians: Option<PathBuf>,
    pub export_fit: Option<PathBuf>,
}
