//! CSV event ingest and manifest loading.
//!
//! Event exports are one CSV per well: a header row of channel names followed
//! by one numeric row per event.
//!
//! Design goals:
//! - **Strict schema** for the header (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no gating logic here

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::data::EventTable;
use crate::domain::ExperimentManifest;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the event table plus what was skipped.
#[derive(Debug, Clone)]
pub struct IngestedEvents {
    pub events: EventTable,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a well's event CSV.
pub fn load_events_csv(path: &Path) -> Result<IngestedEvents, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open event CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{}': {e}", path.display())))?
        .clone();
    let channels = channel_names(&headers)?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); channels.len()];
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header, lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, channels.len()) {
            Ok(values) => {
                for (col, v) in columns.iter_mut().zip(values) {
                    col.push(v);
                }
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        log::warn!(
            "{}: skipped {} of {rows_read} rows (first: line {}: {})",
            path.display(),
            row_errors.len(),
            row_errors[0].line,
            row_errors[0].message
        );
    }

    Ok(IngestedEvents {
        events: EventTable::new(channels, columns)?,
        row_errors,
        rows_read,
    })
}

fn channel_names(headers: &StringRecord) -> Result<Vec<String>, AppError> {
    let names: Vec<String> = headers.iter().map(normalize_header_name).collect();
    if names.is_empty() || names.iter().all(String::is_empty) {
        return Err(AppError::new(2, "Event CSV has no header row"));
    }
    if let Some(pos) = names.iter().position(String::is_empty) {
        return Err(AppError::new(2, format!("Event CSV header column {} is empty", pos + 1)));
    }
    Ok(names)
}

fn normalize_header_name(name: &str) -> String {
    // Some exporters prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn parse_row(record: &StringRecord, width: usize) -> Result<Vec<f64>, String> {
    if record.len() != width {
        return Err(format!("expected {width} fields, found {}", record.len()));
    }
    record
        .iter()
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("invalid number '{s}'"))
        })
        .collect()
}

/// Read an experiment manifest (JSON).
pub fn read_manifest(path: &Path) -> Result<ExperimentManifest, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open manifest '{}': {e}", path.display())))?;
    let manifest: ExperimentManifest = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid manifest '{}': {e}", path.display())))?;

    if manifest.titrations.is_empty() {
        return Err(AppError::new(2, "Manifest lists no titrations"));
    }
    for t in &manifest.titrations {
        if t.concentrations.iter().any(|c| !(c.is_finite() && *c >= 0.0)) {
            return Err(AppError::new(
                2,
                format!("Titration '{}': concentrations must be finite and >= 0", t.name),
            ));
        }
    }
    Ok(manifest)
}
