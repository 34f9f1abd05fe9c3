//! Shared "titration pipeline" logic used by the CLI front-end and tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! manifest -> layout -> well files -> transform -> gates -> medians -> fit
//!
//! Presentation (printing, plotting, exports) stays in `app`.

use std::path::{Path, PathBuf};

use crate::data::{resolve_well_file, stops_from_layout};
use crate::domain::{
    ExperimentManifest, FitSettings, RunConfig, TitrationRecord, TitrationSpec, TransformSpec, WellSummary,
};
use crate::error::AppError;
use crate::fit::{fit_binding, guess_from_settings, FitOptions};
use crate::gating::GatingPipeline;
use crate::io::{build_curve_grid, load_events_csv, read_manifest, CURVE_GRID_POINTS};

/// All computed outputs of a single `kdfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub manifest: ExperimentManifest,
    pub data_dir: PathBuf,
    pub records: Vec<TitrationRecord>,
}

impl RunOutput {
    pub fn fitted_count(&self) -> usize {
        self.records.iter().filter(|r| r.fit.is_some()).count()
    }
}

/// Execute the full pipeline for every titration in the manifest.
pub fn run_pipeline(config: &RunConfig) -> Result<RunOutput, AppError> {
    let manifest = read_manifest(&config.manifest_path)?;
    let data_dir = resolve_data_dir(config, &manifest);
    log::info!(
        "manifest '{}': {} titration(s), data in '{}'",
        config.manifest_path.display(),
        manifest.titrations.len(),
        data_dir.display()
    );

    let gating = GatingPipeline::new(manifest.gates.clone(), manifest.readout.clone(), manifest.min_events);

    let mut records = Vec::with_capacity(manifest.titrations.len());
    for spec in &manifest.titrations {
        let settings = manifest.fit.overlay(&spec.fit).overlay(&config.fit_overrides);
        let record = process_titration(spec, &data_dir, manifest.transform.as_ref(), &gating, &settings)?;
        records.push(record);
    }

    Ok(RunOutput {
        manifest,
        data_dir,
        records,
    })
}

/// Data directory precedence: CLI, manifest (relative to the manifest file),
/// `KDFIT_DATA_DIR`, then the manifest's own directory.
pub fn resolve_data_dir(config: &RunConfig, manifest: &ExperimentManifest) -> PathBuf {
    let manifest_dir = config
        .manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if let Some(dir) = &config.data_dir {
        return dir.clone();
    }
    if let Some(dir) = &manifest.data_dir {
        return if dir.is_absolute() {
            dir.clone()
        } else {
            manifest_dir.join(dir)
        };
    }
    if let Some(dir) = &config.default_data_dir {
        return dir.clone();
    }
    manifest_dir
}

/// Gate every well of one titration and fit its binding curve.
///
/// Input problems (missing files, unknown channels) abort with an `AppError`;
/// a failed fit is recorded on the returned record.
pub fn process_titration(
    spec: &TitrationSpec,
    data_dir: &Path,
    transform: Option<&TransformSpec>,
    gating: &GatingPipeline,
    settings: &FitSettings,
) -> Result<TitrationRecord, AppError> {
    let stops = stops_from_layout(&spec.layout)
        .map_err(|e| AppError::new(2, format!("Titration '{}': {e}", spec.name)))?;
    if stops.len() != spec.concentrations.len() {
        return Err(AppError::new(
            2,
            format!(
                "Titration '{}': layout has {} stops but {} concentrations",
                spec.name,
                stops.len(),
                spec.concentrations.len()
            ),
        ));
    }

    log::info!("titration '{}': {} wells", spec.name, stops.len());

    let mut wells = Vec::with_capacity(stops.len());
    for (stop, &concentration) in stops.iter().zip(spec.concentrations.iter()) {
        let path = resolve_well_file(data_dir, stop)?;
        let mut events = load_events_csv(&path)?.events;
        if let Some(t) = transform {
            events.apply_hlog(&t.channels, t.b);
        }

        let gated = gating.run(&events)?;
        let counts: Vec<String> = gated
            .gate_counts
            .iter()
            .map(|c| format!("{}={}", c.gate, c.remaining))
            .collect();
        log::debug!(
            "{} ({concentration}): {} events, {} -> median {:?}",
            stop.well_id(),
            gated.total_events,
            counts.join(", "),
            gated.median
        );
        if gated.median.is_none() {
            log::warn!("{}: no events survive gating; no median", stop.file_prefix());
        }

        wells.push(WellSummary {
            stop: *stop,
            concentration,
            total_events: gated.total_events,
            gate_counts: gated.gate_counts,
            median: gated.median,
        });
    }

    Ok(fit_record(spec.name.clone(), wells, settings))
}

/// Fit a titration's medians and package the outcome.
pub fn fit_record(name: String, wells: Vec<WellSummary>, settings: &FitSettings) -> TitrationRecord {
    let mut record = TitrationRecord {
        name,
        wells,
        fit: None,
        error: None,
        grid: None,
    };
    let conc = record.concentrations();
    let resp = record.medians();

    let opts = FitOptions::from_settings(settings);
    let guess = guess_from_settings(settings, &conc, &resp);
    match fit_binding(&conc, &resp, &guess, &opts) {
        Ok(fit) => {
            log::info!(
                "titration '{}': kd={:.4} sat={:.2} init={:.2} r2={:.4} ({} iterations)",
                record.name,
                fit.params.kd,
                fit.params.sat,
                fit.params.init,
                fit.r_squared,
                fit.iterations
            );
            if fit.kd_at_bound {
                log::warn!("titration '{}': kd sits on the upper bound {}", record.name, opts.max_kd);
            }
            record.grid = Some(build_curve_grid(&fit.params, &conc, CURVE_GRID_POINTS));
            record.fit = Some(fit);
        }
        Err(e) => {
            log::warn!("titration '{}': fit failed: {e}", record.name);
            record.error = Some(e.to_string());
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{simulate_experiment, SimulationConfig};
    use crate::data::EventTable;
    use crate::domain::{BindingParams, TitrationStop};
    use crate::gating::{Gate, ThresholdRegion};
    use crate::io::{write_events_csv, write_manifest};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kdfit-pipeline-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_for(manifest_path: PathBuf) -> RunConfig {
        RunConfig {
            manifest_path,
            data_dir: None,
            default_data_dir: None,
            fit_overrides: FitSettings::default(),
            plot: false,
            plot_width: 80,
            plot_height: 20,
            export_results: None,
            export_medians: None,
            export_fit: None,
        }
    }

    #[test]
    fn simulated_experiment_recovers_kd() {
        let dir = temp_dir("e2e");
        let truth = BindingParams {
            init: 150.0,
            sat: 8_000.0,
            kd: 25.0,
        };
        let sim = simulate_experiment(&SimulationConfig {
            truth,
            ..SimulationConfig::default()
        })
        .unwrap();
        for well in &sim.wells {
            write_events_csv(&dir.join(&well.file_name), &well.events).unwrap();
        }
        let manifest_path = dir.join("manifest.json");
        write_manifest(&manifest_path, &sim.manifest).unwrap();

        let out = run_pipeline(&config_for(manifest_path)).unwrap();
        assert_eq!(out.records.len(), 1);
        let rec = &out.records[0];
        assert_eq!(rec.wells.len(), 10);
        assert!(rec.wells.iter().all(|w| w.median.is_some()));
        assert!(rec.wells.iter().all(|w| w.gated_events() < w.total_events));

        let fit = rec.fit.as_ref().expect("fit should succeed");
        let rel = (fit.params.kd - truth.kd).abs() / truth.kd;
        assert!(rel < 0.25, "kd={} truth={}", fit.params.kd, truth.kd);
        assert!(fit.r_squared > 0.95);
        assert!(rec.grid.is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_fit_is_recorded_not_raised() {
        let stop = |number| TitrationStop {
            specimen: 1,
            letter: 'A',
            number,
        };
        let well = |number, median| WellSummary {
            stop: stop(number),
            concentration: number as f64,
            total_events: 10,
            gate_counts: Vec::new(),
            median,
        };
        let rec = fit_record(
            "sparse".to_string(),
            vec![well(1, Some(1.0)), well(2, None), well(3, Some(3.0))],
            &FitSettings::default(),
        );
        assert!(rec.fit.is_none());
        assert!(rec.error.as_deref().unwrap_or("").contains("not finite"));
    }

    #[test]
    fn data_dir_precedence() {
        let manifest: ExperimentManifest = serde_json::from_str(
            r#"{"data_dir": "wells", "titrations": [{"name": "t",
                "layout": {"specimens": [1], "letters": "A", "numbers": [1, 2, 3]},
                "concentrations": [1, 2, 3]}]}"#,
        )
        .unwrap();
        let mut cfg = config_for(PathBuf::from("/exp/manifest.json"));
        cfg.default_data_dir = Some(PathBuf::from("/env"));
        assert_eq!(resolve_data_dir(&cfg, &manifest), PathBuf::from("/exp/wells"));

        cfg.data_dir = Some(PathBuf::from("/cli"));
        assert_eq!(resolve_data_dir(&cfg, &manifest), PathBuf::from("/cli"));

        let no_dir = ExperimentManifest {
            data_dir: None,
            ..manifest
        };
        cfg.data_dir = None;
        assert_eq!(resolve_data_dir(&cfg, &no_dir), PathBuf::from("/env"));
        cfg.default_data_dir = None;
        assert_eq!(resolve_data_dir(&cfg, &no_dir), PathBuf::from("/exp"));
    }

    #[test]
    fn hlog_transform_runs_before_gating() {
        let dir = temp_dir("hlog");
        // Raw FSC 1000 maps above 5000 in hlog units (b = 100); raw 10 stays far below.
        for (number, pe) in [(1u32, 10.0), (2, 50.0), (3, 90.0)] {
            let events = EventTable::new(
                vec!["FSC-H".to_string(), "PE-A".to_string()],
                vec![
                    vec![1_000.0, 1_000.0, 1_000.0, 10.0, 10.0],
                    vec![pe, pe + 1.0, pe - 1.0, 99_999.0, 99_999.0],
                ],
            )
            .unwrap();
            write_events_csv(&dir.join(format!("Specimen_001_A{number}.csv")), &events).unwrap();
        }
        let manifest: ExperimentManifest = serde_json::from_str(
            r#"{"transform": {"channels": ["FSC-H"], "b": 100},
                "titrations": [{"name": "t",
                "layout": {"specimens": [1], "letters": "A", "numbers": [1, 2, 3]},
                "concentrations": [1, 10, 100]}]}"#,
        )
        .unwrap();
        let gating = GatingPipeline::new(
            vec![Gate::Threshold {
                name: None,
                channel: "FSC-H".to_string(),
                value: 5_000.0,
                region: ThresholdRegion::Above,
            }],
            "PE-A",
            0,
        );
        let spec = &manifest.titrations[0];
        let settings = FitSettings::default();

        let transformed = process_titration(spec, &dir, manifest.transform.as_ref(), &gating, &settings).unwrap();
        let gated: Vec<usize> = transformed.wells.iter().map(|w| w.gated_events()).collect();
        assert_eq!(gated, vec![3, 3, 3]);
        let medians: Vec<Option<f64>> = transformed.wells.iter().map(|w| w.median).collect();
        assert_eq!(medians, vec![Some(10.0), Some(50.0), Some(90.0)]);

        // Without the transform the same threshold removes every event.
        let raw = process_titration(spec, &dir, None, &gating, &settings).unwrap();
        assert!(raw.wells.iter().all(|w| w.gated_events() == 0 && w.median.is_none()));
        assert!(raw.fit.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn layout_and_concentration_counts_must_agree() {
        let spec: TitrationSpec = serde_json::from_str(
            r#"{"name": "t", "layout": {"specimens": [1], "letters": "A", "numbers": [1, 2, 3]},
                "concentrations": [1, 2]}"#,
        )
        .unwrap();
        let gating = GatingPipeline::new(Vec::new(), "PE-A", 0);
        let err = process_titration(&spec, Path::new("."), None, &gating, &FitSettings::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
