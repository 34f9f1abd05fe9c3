//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the gating + fitting pipeline
//! - prints reports/plots
//! - writes optional exports
//! - drafts gates and simulates experiments

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Command, FitArgs, GateDraftArgs, PlotArgs, SimulateArgs, TuiArgs};
use crate::data::{sample_bounds, simulate_experiment, SimulationConfig};
use crate::domain::{BindingParams, FitSettings, RunConfig};
use crate::error::AppError;
use crate::gating::{Gate, Polygon, PolygonRegion};
use crate::io::{load_events_csv, write_events_csv, write_manifest};

pub mod pipeline;

/// Environment variable naming the fallback data directory.
pub const DATA_DIR_ENV: &str = "KDFIT_DATA_DIR";

/// Entry point for the `kdfit` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` may carry KDFIT_DATA_DIR; a missing file is fine.
    dotenvy::dotenv().ok();

    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::GateDraft(args) => handle_gate_draft(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => handle_tui(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let default_data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
    let config = run_config_from_args(&args, default_data_dir);
    let run = pipeline::run_pipeline(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.manifest.readout, &run.data_dir, &run.records)
    );

    if config.plot {
        for record in &run.records {
            println!("{}", crate::report::format_well_table(record));
            println!("{}", crate::plot::render_titration_plot(record, config.plot_width, config.plot_height));
        }
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::write_results_csv(path, &run.records)?;
        log::info!("wrote fit results to '{}'", path.display());
    }
    if let Some(path) = &config.export_medians {
        crate::io::write_medians_csv(path, &run.records)?;
        log::info!("wrote well medians to '{}'", path.display());
    }
    let fitted = run.fitted_count();
    let total = run.records.len();
    if let Some(path) = &config.export_fit {
        let fit_file = crate::io::build_fit_file(&run.manifest.readout, run.records);
        crate::io::write_fit_json(path, &fit_file)?;
        log::info!("wrote fit file to '{}'", path.display());
    }

    if fitted == 0 {
        return Err(AppError::new(4, format!("No titration could be fitted ({total} attempted).")));
    }
    Ok(())
}

fn handle_gate_draft(args: GateDraftArgs) -> Result<(), AppError> {
    let mut tables = Vec::with_capacity(args.events.len());
    for path in &args.events {
        let mut events = load_events_csv(path)?.events;
        if args.hlog {
            events.apply_hlog(&[args.x.clone(), args.y.clone()], args.hlog_b);
        }
        tables.push(events);
    }

    let bounds = sample_bounds(&tables, &args.x, &args.y)?;
    log::info!(
        "{} file(s): {} in [{}, {}], {} in [{}, {}]",
        tables.len(),
        args.x,
        bounds.x_min,
        bounds.x_max,
        args.y,
        bounds.y_min,
        bounds.y_max
    );

    let gate = Gate::Polygon {
        name: Some("cells".to_string()),
        x_channel: args.x,
        y_channel: args.y,
        vertices: Polygon::initial(args.vertices, &bounds)?,
        region: PolygonRegion::In,
    };
    let json = serde_json::to_string_pretty(&gate)
        .map_err(|e| AppError::new(4, format!("Failed to serialize gate: {e}")))?;
    println!("{json}");
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulation_config_from_args(&args);
    let sim = simulate_experiment(&config)?;

    std::fs::create_dir_all(&args.out).map_err(|e| {
        AppError::new(2, format!("Failed to create output directory '{}': {e}", args.out.display()))
    })?;

    for well in &sim.wells {
        write_events_csv(&args.out.join(&well.file_name), &well.events)?;
    }
    let manifest_path = args.out.join("manifest.json");
    write_manifest(&manifest_path, &sim.manifest)?;

    log::info!(
        "wrote {} well(s) and '{}' (truth: init={} sat={} kd={})",
        sim.wells.len(),
        manifest_path.display(),
        config.truth.init,
        config.truth.sat,
        config.truth.kd
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fit_file = crate::io::read_fit_json(&args.fit)?;
    let plot = crate::plot::render_fit_file_plots(&fit_file, args.width, args.height);
    println!("{plot}");
    Ok(())
}

fn handle_tui(args: TuiArgs) -> Result<(), AppError> {
    crate::tui::run(&args.fit)
}

pub fn run_config_from_args(args: &FitArgs, default_data_dir: Option<PathBuf>) -> RunConfig {
    RunConfig {
        manifest_path: args.manifest.clone(),
        data_dir: args.data_dir.clone(),
        default_data_dir,
        fit_overrides: FitSettings {
            max_kd: args.max_kd,
            init: args.init,
            sat: args.sat,
            kd: args.kd,
            grid_steps: args.grid_steps,
            max_iterations: args.max_iterations,
        },
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_medians: args.export_medians.clone(),
        export_fit: args.export_fit.clone(),
    }
}

fn simulation_config_from_args(args: &SimulateArgs) -> SimulationConfig {
    let defaults = SimulationConfig::default();
    SimulationConfig {
        truth: BindingParams {
            init: args.init,
            sat: args.sat,
            kd: args.kd,
        },
        concentrations: args.concentrations.clone().unwrap_or(defaults.concentrations),
        events_per_well: args.events,
        seed: args.seed,
        specimen: args.specimen,
        letter: args.letter,
        ..SimulationConfig::default()
    }
}

/// Rewrite argv so a bare manifest path means `fit`.
///
/// Rules:
/// - `kdfit x.json ...`              -> `kdfit fit --manifest x.json ...`
/// - `kdfit`                         -> `kdfit --help`
/// - `kdfit <subcommand>/--help/...` -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("--help".to_string());
        return argv;
    };

    let passthrough = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help" | "fit" | "gate-draft" | "simulate" | "plot" | "tui"
    );
    if passthrough || arg1.starts_with('-') {
        return argv;
    }

    if Path::new(&arg1).extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        argv.splice(1..2, ["fit".to_string(), "--manifest".to_string(), arg1]);
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_shows_help() {
        assert_eq!(rewrite_args(args(&["kdfit"])), args(&["kdfit", "--help"]));
    }

    #[test]
    fn manifest_path_implies_fit() {
        assert_eq!(
            rewrite_args(args(&["kdfit", "exp/manifest.json", "--no-plot"])),
            args(&["kdfit", "fit", "--manifest", "exp/manifest.json", "--no-plot"])
        );
    }

    #[test]
    fn subcommands_and_flags_pass_through() {
        let fit = args(&["kdfit", "simulate", "--out", "d"]);
        assert_eq!(rewrite_args(fit.clone()), fit);
        let help = args(&["kdfit", "--version"]);
        assert_eq!(rewrite_args(help.clone()), help);
        let other = args(&["kdfit", "bogus"]);
        assert_eq!(rewrite_args(other.clone()), other);
    }

    #[test]
    fn run_config_merges_cli_overrides() {
        let cli = crate::cli::Cli::parse_from(["kdfit", "fit", "-m", "m.json", "--kd", "3", "--no-plot"]);
        let Command::Fit(fit) = cli.command else {
            panic!("expected fit");
        };
        let cfg = run_config_from_args(&fit, Some(PathBuf::from("/env")));
        assert_eq!(cfg.fit_overrides.kd, Some(3.0));
        assert_eq!(cfg.fit_overrides.max_kd, None);
        assert!(!cfg.plot);
        assert_eq!(cfg.default_data_dir, Some(PathBuf::from("/env")));
    }
}
