//! Titration layouts and well-file resolution.

use std::path::{Path, PathBuf};

use crate::domain::{StopLayout, TitrationStop};
use crate::error::AppError;

/// Expand per-stop specimen numbers, well letters and well numbers into stops.
///
/// Each argument has length 1 or C, and at least one has length C > 1.
/// Length-1 arguments are repeated for every stop.
pub fn make_titration(
    specimens: &[u32],
    letters: &str,
    numbers: &[u32],
) -> Result<Vec<TitrationStop>, AppError> {
    let letters: Vec<char> = letters.chars().collect();
    let lens = [specimens.len(), letters.len(), numbers.len()];
    if lens.contains(&0) {
        return Err(AppError::new(2, "Titration layout lists must not be empty"));
    }

    let count = lens.iter().copied().max().unwrap_or(0);
    if count == 1 {
        return Err(AppError::new(
            2,
            "At least one titration layout list must have more than one entry",
        ));
    }
    if lens.iter().any(|&len| len != 1 && len != count) {
        return Err(AppError::new(
            2,
            format!(
                "Titration layout lists must have length 1 or {count} (specimens={}, letters={}, numbers={})",
                lens[0], lens[1], lens[2]
            ),
        ));
    }

    let pick = |len: usize, i: usize| if len == 1 { 0 } else { i };
    Ok((0..count)
        .map(|i| TitrationStop {
            specimen: specimens[pick(lens[0], i)],
            letter: letters[pick(lens[1], i)],
            number: numbers[pick(lens[2], i)],
        })
        .collect())
}

pub fn stops_from_layout(layout: &StopLayout) -> Result<Vec<TitrationStop>, AppError> {
    make_titration(&layout.specimens, &layout.letters, &layout.numbers)
}

/// Does `stem` belong to `stop`? The prefix must not continue with a digit,
/// so `A1` never matches `A10`.
fn stem_matches(stem: &str, prefix: &str) -> bool {
    match stem.strip_prefix(prefix) {
        Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

/// Locate the `.csv` event export for `stop` inside `dir`.
pub fn resolve_well_file(dir: &Path, stop: &TitrationStop) -> Result<PathBuf, AppError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to read data directory '{}': {e}", dir.display()),
        )
    })?;

    let prefix = stop.file_prefix();
    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::new(2, format!("Failed to list '{}': {e}", dir.display())))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem_matches(stem, &prefix) {
            matches.push(path);
        }
    }
    matches.sort();

    match matches.len() {
        0 => Err(AppError::new(
            2,
            format!("No event file for {prefix} in '{}'", dir.display()),
        )),
        1 => Ok(matches.remove(0)),
        _ => Err(AppError::new(
            2,
            format!(
                "Ambiguous event files for {prefix}: {}",
                matches
                    .iter()
                    .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kdfit-titration-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn broadcasts_length_one_lists() {
        let stops = make_titration(&[1], "A", &[1, 2, 3]).unwrap();
        assert_eq!(stops.len(), 3);
        assert_eq!(stops[2].file_prefix(), "Specimen_001_A3");

        let stops = make_titration(&[1, 2], "AB", &[12]).unwrap();
        assert_eq!(stops[1].file_prefix(), "Specimen_002_B12");
    }

    #[test]
    fn rejects_all_singletons_and_mismatches() {
        assert!(make_titration(&[1], "A", &[1]).is_err());
        assert!(make_titration(&[1, 2], "ABC", &[1]).is_err());
        assert!(make_titration(&[], "A", &[1, 2]).is_err());
    }

    #[test]
    fn a1_does_not_match_a10() {
        let dir = temp_dir("a1");
        for name in ["Specimen_001_A1_A01.csv", "Specimen_001_A10_A10.csv", "Specimen_001_A1.fcs"] {
            std::fs::write(dir.join(name), "PE-A\n1\n").unwrap();
        }
        let stop = TitrationStop {
            specimen: 1,
            letter: 'A',
            number: 1,
        };
        let path = resolve_well_file(&dir, &stop).unwrap();
        assert!(path.ends_with("Specimen_001_A1_A01.csv"));

        let ten = TitrationStop { number: 10, ..stop };
        assert!(resolve_well_file(&dir, &ten).unwrap().ends_with("Specimen_001_A10_A10.csv"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_and_ambiguous_files_are_errors() {
        let dir = temp_dir("ambiguous");
        std::fs::write(dir.join("Specimen_002_B3.csv"), "PE-A\n1\n").unwrap();
        std::fs::write(dir.join("Specimen_002_B3_copy.csv"), "PE-A\n1\n").unwrap();

        let stop = TitrationStop {
            specimen: 2,
            letter: 'B',
            number: 3,
        };
        let err = resolve_well_file(&dir, &stop).unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));

        let missing = TitrationStop { number: 4, ..stop };
        assert!(resolve_well_file(&dir, &missing).unwrap_err().to_string().contains("No event file"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
