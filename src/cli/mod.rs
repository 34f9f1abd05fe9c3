//! Command-line parsing for the FACS titration Kd fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the gating/fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "kdfit", version, about = "FACS titration gating and Kd fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gate every well of the manifest's titrations, fit Kd, print and optionally export.
    Fit(FitArgs),
    /// Print an initial polygon gate (JSON) sized to the events of some wells.
    GateDraft(GateDraftArgs),
    /// Write synthetic well CSVs and a manifest from a known binding curve.
    Simulate(SimulateArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
    /// Browse a previously exported fit JSON in a terminal UI.
    Tui(TuiArgs),
}

/// Options for a fitting run.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Experiment manifest (JSON).
    #[arg(short = 'm', long, value_name = "JSON")]
    pub manifest: PathBuf,

    /// Directory holding the well CSVs (overrides the manifest and `KDFIT_DATA_DIR`).
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Upper bound on Kd for every titration.
    #[arg(long)]
    pub max_kd: Option<f64>,

    /// Initial guess for the baseline.
    #[arg(long)]
    pub init: Option<f64>,

    /// Initial guess for the amplitude.
    #[arg(long)]
    pub sat: Option<f64>,

    /// Initial guess for Kd.
    #[arg(long)]
    pub kd: Option<f64>,

    /// Kd grid steps for the initial search.
    #[arg(long)]
    pub grid_steps: Option<usize>,

    /// Iteration cap for the refinement.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export per-titration fit records to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export per-well medians and gate counts to CSV.
    #[arg(long = "export-medians")]
    pub export_medians: Option<PathBuf>,

    /// Export the full run (wells + fits + curve grids) to JSON.
    #[arg(long = "export-fit")]
    pub export_fit: Option<PathBuf>,
}

/// Options for drafting a polygon gate.
#[derive(Debug, Parser, Clone)]
pub struct GateDraftArgs {
    /// Event CSV files whose combined bounds size the polygon.
    #[arg(long, value_name = "CSV", num_args = 1.., required = true)]
    pub events: Vec<PathBuf>,

    /// X channel.
    #[arg(long)]
    pub x: String,

    /// Y channel.
    #[arg(long)]
    pub y: String,

    /// Number of polygon vertices.
    #[arg(long, default_value_t = 8)]
    pub vertices: usize,

    /// Apply the hyperlog transform to both channels first.
    #[arg(long)]
    pub hlog: bool,

    /// Hyperlog `b` parameter.
    #[arg(long, default_value_t = crate::domain::DEFAULT_HLOG_B)]
    pub hlog_b: f64,
}

/// Options for generating a synthetic experiment.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output directory (created if missing).
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// True baseline.
    #[arg(long, default_value_t = 150.0)]
    pub init: f64,

    /// True amplitude.
    #[arg(long, default_value_t = 8_000.0)]
    pub sat: f64,

    /// True Kd.
    #[arg(long, default_value_t = 25.0)]
    pub kd: f64,

    /// Concentrations, one well each (defaults to a 10-point half-log series).
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub concentrations: Option<Vec<f64>>,

    /// Events per well.
    #[arg(short = 'n', long, default_value_t = 2_000)]
    pub events: usize,

    /// Random seed.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Specimen number used in file names.
    #[arg(long, default_value_t = 1)]
    pub specimen: u32,

    /// Well row letter.
    #[arg(long, default_value_t = 'A')]
    pub letter: char,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `kdfit fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for the terminal viewer.
#[derive(Debug, Parser)]
pub struct TuiArgs {
    /// Fit JSON file produced by `kdfit fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_overrides() {
        let cli = Cli::parse_from([
            "kdfit", "fit", "--manifest", "m.json", "--max-kd", "500", "--no-plot", "--export-fit", "out.json",
        ]);
        match cli.command {
            Command::Fit(args) => {
                assert_eq!(args.manifest, PathBuf::from("m.json"));
                assert_eq!(args.max_kd, Some(500.0));
                assert!(args.no_plot);
                assert_eq!(args.export_fit, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_comma_separated_concentrations() {
        let cli = Cli::parse_from(["kdfit", "simulate", "--out", "d", "--concentrations", "100,10,1,0"]);
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.concentrations, Some(vec![100.0, 10.0, 1.0, 0.0]));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn gate_draft_takes_several_files() {
        let cli = Cli::parse_from([
            "kdfit", "gate-draft", "--events", "a.csv", "b.csv", "--x", "FSC-H", "--y", "SSC-H",
        ]);
        match cli.command {
            Command::GateDraft(args) => {
                assert_eq!(args.events.len(), 2);
                assert_eq!(args.vertices, 8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
