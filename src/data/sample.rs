//! Synthetic titration wells generated from a known binding curve.
//!
//! Each well mixes three populations:
//! - debris: small FSC/SSC, background PE
//! - non-expressing cells: no display signal, background PE
//! - expressing cells: display signal on Alexa Fluor 680, PE following the model
//!
//! PE on expressing cells is `predict(truth, c) * LogNormal(0, sigma)` so the
//! population median tracks the binding curve. A manifest with a cell polygon
//! and an expression threshold is produced alongside the wells.

use std::path::PathBuf;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{LogNormal, Normal};

use crate::data::EventTable;
use crate::domain::{
    BindingParams, ExperimentManifest, FitSettings, StopLayout, TitrationSpec, TitrationStop, DEFAULT_READOUT,
};
use crate::error::AppError;
use crate::gating::{Gate, Polygon, PolygonRegion, ThresholdRegion};
use crate::models::predict;

pub const SIM_CHANNELS: [&str; 5] = ["FSC-H", "SSC-H", "SSC-W", "Alexa Fluor 680-A", "PE-A"];

/// Display threshold separating expressing cells.
const EXPRESSION_THRESHOLD: f64 = 1_000.0;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub truth: BindingParams,
    pub concentrations: Vec<f64>,
    pub events_per_well: usize,
    pub seed: u64,
    pub specimen: u32,
    pub letter: char,
    /// Fraction of events that are debris.
    pub debris_fraction: f64,
    /// Fraction of cells that display the protein.
    pub expressing_fraction: f64,
    /// Log-scale spread of per-cell PE around the binding curve.
    pub pe_sigma: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            truth: BindingParams {
                init: 150.0,
                sat: 8_000.0,
                kd: 25.0,
            },
            concentrations: vec![
                1_000.0, 316.2, 100.0, 31.62, 10.0, 3.162, 1.0, 0.3162, 0.1, 0.0,
            ],
            events_per_well: 2_000,
            seed: 7,
            specimen: 1,
            letter: 'A',
            debris_fraction: 0.15,
            expressing_fraction: 0.6,
            pe_sigma: 0.35,
        }
    }
}

/// One simulated well ready to be written as `<file_name>`.
#[derive(Debug, Clone)]
pub struct SimulatedWell {
    pub stop: TitrationStop,
    pub concentration: f64,
    pub file_name: String,
    pub events: EventTable,
}

#[derive(Debug, Clone)]
pub struct SimulatedExperiment {
    pub wells: Vec<SimulatedWell>,
    pub manifest: ExperimentManifest,
}

pub fn simulate_experiment(config: &SimulationConfig) -> Result<SimulatedExperiment, AppError> {
    validate(config)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let numbers: Vec<u32> = (1..=config.concentrations.len() as u32).collect();

    let mut wells = Vec::with_capacity(config.concentrations.len());
    for (&number, &conc) in numbers.iter().zip(config.concentrations.iter()) {
        let stop = TitrationStop {
            specimen: config.specimen,
            letter: config.letter,
            number,
        };
        let events = simulate_well(&mut rng, config, conc)?;
        wells.push(SimulatedWell {
            stop,
            concentration: conc,
            file_name: format!("{}_{}{:02}.csv", stop.file_prefix(), stop.letter, stop.number),
            events,
        });
    }

    let manifest = ExperimentManifest {
        data_dir: Some(PathBuf::from(".")),
        readout: DEFAULT_READOUT.to_string(),
        transform: None,
        gates: default_gates()?,
        min_events: 20,
        fit: FitSettings::default(),
        titrations: vec![TitrationSpec {
            name: format!("simulated-kd-{}", config.truth.kd),
            layout: StopLayout {
                specimens: vec![config.specimen],
                letters: config.letter.to_string(),
                numbers,
            },
            concentrations: config.concentrations.clone(),
            fit: FitSettings::default(),
        }],
    };

    Ok(SimulatedExperiment { wells, manifest })
}

fn validate(config: &SimulationConfig) -> Result<(), AppError> {
    if config.concentrations.len() < 2 {
        return Err(AppError::new(2, "Simulation needs at least 2 concentrations."));
    }
    if config.concentrations.iter().any(|c| !(c.is_finite() && *c >= 0.0)) {
        return Err(AppError::new(2, "Simulation concentrations must be finite and >= 0."));
    }
    if config.events_per_well == 0 {
        return Err(AppError::new(2, "Events per well must be > 0."));
    }
    let BindingParams { init, sat, kd } = config.truth;
    if !(init.is_finite() && sat.is_finite() && kd.is_finite() && kd > 0.0) {
        return Err(AppError::new(2, "Simulation parameters must be finite with kd > 0."));
    }
    for (name, p) in [
        ("debris fraction", config.debris_fraction),
        ("expressing fraction", config.expressing_fraction),
    ] {
        if !(0.0..=1.0).contains(&p) {
            return Err(AppError::new(2, format!("Invalid {name}: {p}")));
        }
    }
    if !(config.pe_sigma.is_finite() && config.pe_sigma >= 0.0) {
        return Err(AppError::new(2, "PE spread must be finite and >= 0."));
    }
    Ok(())
}

/// Cells polygon on FSC-H/SSC-H plus a display threshold.
pub fn default_gates() -> Result<Vec<Gate>, AppError> {
    Ok(vec![
        Gate::Polygon {
            name: Some("cells".to_string()),
            x_channel: "FSC-H".to_string(),
            y_channel: "SSC-H".to_string(),
            vertices: Polygon::new(vec![
                [30_000.0, 15_000.0],
                [95_000.0, 15_000.0],
                [95_000.0, 70_000.0],
                [30_000.0, 70_000.0],
            ])?,
            region: PolygonRegion::In,
        },
        Gate::Threshold {
            name: Some("expressing".to_string()),
            channel: "Alexa Fluor 680-A".to_string(),
            value: EXPRESSION_THRESHOLD,
            region: ThresholdRegion::Above,
        },
    ])
}

fn dist_err(e: impl std::fmt::Display) -> AppError {
    AppError::new(4, format!("Sampling distribution error: {e}"))
}

fn simulate_well(rng: &mut StdRng, config: &SimulationConfig, conc: f64) -> Result<EventTable, AppError> {
    let n = config.events_per_well;

    let cell_fsc = Normal::new(60_000.0, 8_000.0).map_err(dist_err)?;
    let cell_ssc = Normal::new(40_000.0, 6_000.0).map_err(dist_err)?;
    let cell_ssc_w = Normal::new(70_000.0, 5_000.0).map_err(dist_err)?;
    let debris_fsc = LogNormal::new(8_000f64.ln(), 0.5).map_err(dist_err)?;
    let debris_ssc = LogNormal::new(5_000f64.ln(), 0.6).map_err(dist_err)?;
    let display = LogNormal::new(6_000f64.ln(), 0.4).map_err(dist_err)?;
    let no_display = Normal::new(100.0, 80.0).map_err(dist_err)?;
    let pe_spread = LogNormal::new(0.0, config.pe_sigma).map_err(dist_err)?;
    let background = Normal::new(0.0, 40.0).map_err(dist_err)?;

    let bound = predict(&config.truth, conc);
    let baseline = config.truth.init;

    let mut columns: Vec<Vec<f64>> = (0..SIM_CHANNELS.len()).map(|_| Vec::with_capacity(n)).collect();
    for _ in 0..n {
        let row = if rng.gen_bool(config.debris_fraction) {
            [
                debris_fsc.sample(rng),
                debris_ssc.sample(rng),
                rng.gen_range(10_000.0..60_000.0),
                no_display.sample(rng),
                baseline + background.sample(rng),
            ]
        } else if rng.gen_bool(config.expressing_fraction) {
            [
                cell_fsc.sample(rng),
                cell_ssc.sample(rng),
                cell_ssc_w.sample(rng),
                display.sample(rng),
                bound * pe_spread.sample(rng),
            ]
        } else {
            [
                cell_fsc.sample(rng),
                cell_ssc.sample(rng),
                cell_ssc_w.sample(rng),
                no_display.sample(rng),
                baseline + background.sample(rng),
            ]
        };
        for (col, v) in columns.iter_mut().zip(row) {
            col.push(v);
        }
    }

    EventTable::new(SIM_CHANNELS.iter().map(|s| s.to_string()).collect(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::stops_from_layout;

    #[test]
    fn simulation_is_deterministic_for_a_seed() {
        let cfg = SimulationConfig {
            events_per_well: 50,
            ..SimulationConfig::default()
        };
        let a = simulate_experiment(&cfg).unwrap();
        let b = simulate_experiment(&cfg).unwrap();
        assert_eq!(a.wells[3].events, b.wells[3].events);

        let other = simulate_experiment(&SimulationConfig { seed: 8, ..cfg }).unwrap();
        assert_ne!(a.wells[3].events, other.wells[3].events);
    }

    #[test]
    fn manifest_layout_matches_wells() {
        let cfg = SimulationConfig {
            events_per_well: 10,
            ..SimulationConfig::default()
        };
        let sim = simulate_experiment(&cfg).unwrap();
        let stops = stops_from_layout(&sim.manifest.titrations[0].layout).unwrap();
        assert_eq!(stops.len(), sim.wells.len());
        for (stop, well) in stops.iter().zip(sim.wells.iter()) {
            assert_eq!(*stop, well.stop);
            assert!(well.file_name.starts_with(&stop.file_prefix()));
            assert_eq!(well.events.len(), 10);
            assert_eq!(well.events.channels().len(), SIM_CHANNELS.len());
        }
        assert_eq!(sim.wells[0].file_name, "Specimen_001_A1_A01.csv");
    }

    #[test]
    fn rejects_bad_fractions() {
        let cfg = SimulationConfig {
            debris_fraction: 1.5,
            ..SimulationConfig::default()
        };
        assert_eq!(simulate_experiment(&cfg).unwrap_err().exit_code(), 2);
    }
}
