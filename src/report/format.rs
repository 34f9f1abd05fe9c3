//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the gating/fitting code stays clean and testable
//! - output changes are localized

use std::path::Path;

use crate::domain::TitrationRecord;

/// Run header plus the per-titration fit table.
pub fn format_run_summary(readout: &str, data_dir: &Path, records: &[TitrationRecord]) -> String {
    let mut out = String::new();

    out.push_str("=== kdfit - FACS titration Kd fit ===\n");
    out.push_str(&format!("Readout: {readout} (median of gated events)\n"));
    out.push_str(&format!("Data: {}\n", data_dir.display()));
    let fitted = records.iter().filter(|r| r.fit.is_some()).count();
    out.push_str(&format!("Titrations: {} ({} fitted)\n\n", records.len(), fitted));

    out.push_str(&format_fit_table(records));
    out
}

/// One row per titration: `kd ± stderr`, amplitude, baseline, R², status.
pub fn format_fit_table(records: &[TitrationRecord]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<20} {:>12} {:>10} {:>12} {:>10} {:>8} {:>3} {:<10}",
            "titration", "kd", "kd_se", "sat", "init", "r2", "n", "status"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<20} {:-<12} {:-<10} {:-<12} {:-<10} {:-<8} {:-<3} {:-<10}",
            "", "", "", "", "", "", "", ""
        ),
    );

    for r in records {
        let line = match &r.fit {
            Some(f) => format!(
                "{:<20} {:>12} {:>10} {:>12.2} {:>10.2} {:>8.4} {:>3} {:<10}",
                truncate(&r.name, 20),
                fmt_num(f.params.kd),
                f.stderr.kd.map(fmt_num).unwrap_or_else(|| "-".to_string()),
                f.params.sat,
                f.params.init,
                f.r_squared,
                f.n_points,
                if f.kd_at_bound { "at bound" } else { "ok" },
            ),
            None => format!(
                "{:<20} {:>12} {:>10} {:>12} {:>10} {:>8} {:>3} failed: {}",
                truncate(&r.name, 20),
                "-",
                "-",
                "-",
                "-",
                "-",
                r.wells.len(),
                r.error.as_deref().unwrap_or("not fitted"),
            ),
        };
        push_line(&mut out, line);
    }
    out
}

/// Per-well table of one titration: concentration, counts after each gate, median.
pub fn format_well_table(record: &TitrationRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("Wells of '{}':\n", record.name));

    let gate_names: Vec<String> = record
        .wells
        .first()
        .map(|w| w.gate_counts.iter().map(|c| truncate(&c.gate, 14)).collect())
        .unwrap_or_default();

    let mut header = format!("{:<6} {:>12} {:>8}", "well", "conc", "events");
    for g in &gate_names {
        header.push_str(&format!(" {g:>14}"));
    }
    header.push_str(&format!(" {:>12}", "median"));
    push_line(&mut out, header);

    for w in &record.wells {
        let mut line = format!(
            "{:<6} {:>12} {:>8}",
            w.stop.well_id(),
            fmt_num(w.concentration),
            w.total_events
        );
        for c in &w.gate_counts {
            line.push_str(&format!(" {:>14}", c.remaining));
        }
        let median = w.median.map(|m| format!("{m:.2}")).unwrap_or_else(|| "-".to_string());
        line.push_str(&format!(" {median:>12}"));
        push_line(&mut out, line);
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Compact number formatting for values spanning several decades.
fn fmt_num(v: f64) -> String {
    let a = v.abs();
    if v == 0.0 {
        "0".to_string()
    } else if !(1e-3..1e6).contains(&a) {
        format!("{v:.3e}")
    } else if a >= 100.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BindingFit, BindingParams, GateCount, StdErrors, TitrationStop, WellSummary};

    fn well(number: u32, concentration: f64, median: Option<f64>) -> WellSummary {
        WellSummary {
            stop: TitrationStop {
                specimen: 1,
                letter: 'B',
                number,
            },
            concentration,
            total_events: 1000,
            gate_counts: vec![
                GateCount {
                    gate: "cells".to_string(),
                    remaining: 800,
                },
                GateCount {
                    gate: "expressing".to_string(),
                    remaining: 500,
                },
            ],
            median,
        }
    }

    fn fitted() -> TitrationRecord {
        TitrationRecord {
            name: "clone-1".to_string(),
            wells: vec![well(1, 1000.0, Some(4321.5)), well(2, 0.0, None)],
            fit: Some(BindingFit {
                params: BindingParams {
                    init: 150.0,
                    sat: 8000.0,
                    kd: 25.0,
                },
                stderr: StdErrors {
                    init: Some(1.0),
                    sat: Some(2.0),
                    kd: Some(0.5),
                },
                chisqr: 1.0,
                redchi: Some(0.1),
                r_squared: 0.999,
                n_points: 10,
                iterations: 7,
                kd_at_bound: false,
            }),
            error: None,
            grid: None,
        }
    }

    #[test]
    fn fit_table_shows_kd_and_failures() {
        let failed = TitrationRecord {
            name: "clone-2".to_string(),
            fit: None,
            error: Some("need at least 3 points to fit, got 2".to_string()),
            ..fitted()
        };
        let table = format_fit_table(&[fitted(), failed]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("clone-1"));
        assert!(lines[2].contains("25.0000"));
        assert!(lines[2].contains("0.5000"));
        assert!(lines[2].ends_with("ok"));
        assert!(lines[3].contains("failed: need at least 3 points"));
    }

    #[test]
    fn well_table_lists_gate_counts() {
        let table = format_well_table(&fitted());
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[1].contains("cells"));
        assert!(lines[1].contains("expressing"));
        assert!(lines[2].starts_with("B1"));
        assert!(lines[2].contains("4321.50"));
        assert!(lines[3].trim_end().ends_with('-'));
    }

    #[test]
    fn numbers_switch_to_scientific_outside_range() {
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(25.0), "25.0000");
        assert_eq!(fmt_num(40000.0), "40000.0");
        assert_eq!(fmt_num(1.5e-5), "1.500e-5");
    }

    #[test]
    fn summary_counts_fitted_titrations() {
        let s = format_run_summary("PE-A", Path::new("/data"), &[fitted()]);
        assert!(s.contains("Readout: PE-A"));
        assert!(s.contains("Titrations: 1 (1 fitted)"));
    }
}
