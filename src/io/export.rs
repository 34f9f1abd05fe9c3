//! Export fit records, per-well medians and event tables to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::data::EventTable;
use crate::domain::{ExperimentManifest, TitrationRecord};
use crate::error::AppError;

/// One row of the results export; empty cells for a failed fit.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    name: &'a str,
    kd: Option<f64>,
    kd_stderr: Option<f64>,
    sat: Option<f64>,
    sat_stderr: Option<f64>,
    init: Option<f64>,
    init_stderr: Option<f64>,
    chisqr: Option<f64>,
    redchi: Option<f64>,
    r_squared: Option<f64>,
    n_points: usize,
    iterations: Option<usize>,
    kd_at_bound: Option<bool>,
    status: String,
}

impl<'a> ResultRow<'a> {
    fn from_record(r: &'a TitrationRecord) -> Self {
        match &r.fit {
            Some(f) => Self {
                name: &r.name,
                kd: Some(f.params.kd),
                kd_stderr: f.stderr.kd,
                sat: Some(f.params.sat),
                sat_stderr: f.stderr.sat,
                init: Some(f.params.init),
                init_stderr: f.stderr.init,
                chisqr: Some(f.chisqr),
                redchi: f.redchi,
                r_squared: Some(f.r_squared),
                n_points: f.n_points,
                iterations: Some(f.iterations),
                kd_at_bound: Some(f.kd_at_bound),
                status: "ok".to_string(),
            },
            None => Self {
                name: &r.name,
                kd: None,
                kd_stderr: None,
                sat: None,
                sat_stderr: None,
                init: None,
                init_stderr: None,
                chisqr: None,
                redchi: None,
                r_squared: None,
                n_points: r.wells.iter().filter(|w| w.median.is_some()).count(),
                iterations: None,
                kd_at_bound: None,
                status: format!("error: {}", r.error.as_deref().unwrap_or("not fitted")),
            },
        }
    }
}

/// One row of the medians export.
#[derive(Debug, Serialize)]
struct MedianRow<'a> {
    titration: &'a str,
    well: String,
    file_prefix: String,
    concentration: f64,
    total_events: usize,
    gated_events: usize,
    median: Option<f64>,
}

fn csv_writer(path: &Path, what: &str) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} CSV '{}': {e}", path.display())))
}

/// Write one row per titration: parameters, errors, statistics, status.
pub fn write_results_csv(path: &Path, records: &[TitrationRecord]) -> Result<(), AppError> {
    let mut writer = csv_writer(path, "export")?;
    let err = |e: csv::Error| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()));

    for r in records {
        writer.serialize(ResultRow::from_record(r)).map_err(err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV '{}': {e}", path.display())))
}

/// Write one row per well: layout, concentration, gate counts, median.
pub fn write_medians_csv(path: &Path, records: &[TitrationRecord]) -> Result<(), AppError> {
    let mut writer = csv_writer(path, "medians")?;
    let err = |e: csv::Error| AppError::new(2, format!("Failed to write medians CSV '{}': {e}", path.display()));

    for r in records {
        for w in &r.wells {
            let row = MedianRow {
                titration: &r.name,
                well: w.stop.well_id(),
                file_prefix: w.stop.file_prefix(),
                concentration: w.concentration,
                total_events: w.total_events,
                gated_events: w.gated_events(),
                median: w.median,
            };
            writer.serialize(row).map_err(err)?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush medians CSV '{}': {e}", path.display())))
}

/// Write an event table with a channel header row.
pub fn write_events_csv(path: &Path, events: &EventTable) -> Result<(), AppError> {
    let mut writer = csv_writer(path, "event")?;
    let err = |e: csv::Error| AppError::new(2, format!("Failed to write event CSV '{}': {e}", path.display()));

    writer.write_record(events.channels()).map_err(err)?;
    let columns = events
        .channels()
        .iter()
        .map(|c| events.column(c))
        .collect::<Result<Vec<_>, _>>()?;
    for i in 0..events.len() {
        writer
            .write_record(columns.iter().map(|col| format!("{:.3}", col[i])))
            .map_err(err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush event CSV '{}': {e}", path.display())))?;
    Ok(())
}

pub fn write_manifest(path: &Path, manifest: &ExperimentManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create manifest '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::new(2, format!("Failed to write manifest: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BindingFit, BindingParams, StdErrors, TitrationStop, WellSummary};
    use crate::io::ingest::load_events_csv;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("kdfit-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn record(fit: Option<BindingFit>, error: Option<&str>) -> TitrationRecord {
        TitrationRecord {
            name: "clone, 7".to_string(),
            wells: vec![WellSummary {
                stop: TitrationStop {
                    specimen: 1,
                    letter: 'A',
                    number: 1,
                },
                concentration: 100.0,
                total_events: 10,
                gate_counts: Vec::new(),
                median: Some(42.0),
            }],
            fit,
            error: error.map(str::to_string),
            grid: None,
        }
    }

    #[test]
    fn results_csv_has_one_row_per_titration() {
        let fit = BindingFit {
            params: BindingParams {
                init: 1.0,
                sat: 2.0,
                kd: 3.0,
            },
            stderr: StdErrors::default(),
            chisqr: 0.5,
            redchi: None,
            r_squared: 0.9,
            n_points: 3,
            iterations: 4,
            kd_at_bound: false,
        };
        let path = temp_path("results.csv");
        write_results_csv(&path, &[record(Some(fit), None), record(None, Some("too few points"))]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header.len(), 14);
        assert_eq!(header[0], "name");
        assert_eq!(header[13], "status");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "clone, 7");
        assert_eq!(rows[0][1].parse::<f64>().unwrap(), 3.0);
        assert_eq!(&rows[0][2], "");
        assert_eq!(&rows[0][12], "false");
        assert_eq!(&rows[0][13], "ok");

        assert_eq!(rows[1].len(), 14);
        assert_eq!(&rows[1][1], "");
        assert_eq!(&rows[1][10], "1");
        assert_eq!(&rows[1][13], "error: too few points");
    }

    #[test]
    fn medians_csv_has_one_row_per_well() {
        let mut rec = record(None, Some("x"));
        rec.wells[0].median = None;
        let path = temp_path("medians.csv");
        write_medians_csv(&path, &[rec]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec!["titration", "well", "file_prefix", "concentration", "total_events", "gated_events", "median"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "A1");
        assert_eq!(&rows[0][2], "Specimen_001_A1");
        assert_eq!(&rows[0][5], "10");
        assert_eq!(&rows[0][6], "");
    }

    #[test]
    fn events_round_trip_through_csv() {
        let events = EventTable::new(
            vec!["FSC-H".to_string(), "PE-A".to_string()],
            vec![vec![1.5, 2.25], vec![-3.0, 4.0]],
        )
        .unwrap();
        let path = temp_path("events.csv");
        write_events_csv(&path, &events).unwrap();
        let back = load_events_csv(&path).unwrap();
        assert!(back.row_errors.is_empty());
        assert_eq!(back.events, events);
    }
}
