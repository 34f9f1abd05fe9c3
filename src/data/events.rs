//! Per-well event table: named channels, one `f64` column per channel.

use crate::domain::ROUND_INTERVAL;
use crate::error::AppError;
use crate::math::hlog_in_place;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventTable {
    channels: Vec<String>,
    columns: Vec<Vec<f64>>,
}

/// Rectangular bounds on two channels, snapped outward to `ROUND_INTERVAL`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl EventTable {
    /// Build a table from channel names and equally long columns.
    pub fn new(channels: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if channels.len() != columns.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Event table has {} channels but {} columns",
                    channels.len(),
                    columns.len()
                ),
            ));
        }
        if let Some(first) = columns.first() {
            if let Some((idx, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != first.len()) {
                return Err(AppError::new(
                    2,
                    format!(
                        "Channel '{}' has {} events, expected {}",
                        channels[idx],
                        col.len(),
                        first.len()
                    ),
                ));
            }
        }
        for (i, name) in channels.iter().enumerate() {
            if channels[..i].contains(name) {
                return Err(AppError::new(2, format!("Duplicate channel '{name}'")));
            }
        }
        Ok(Self { channels, columns })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Number of events (rows).
    pub fn len(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<&[f64], AppError> {
        let idx = self.index_of(name)?;
        Ok(&self.columns[idx])
    }

    fn index_of(&self, name: &str) -> Result<usize, AppError> {
        self.channels.iter().position(|c| c == name).ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "Channel '{name}' not found. Available: {}",
                    self.channels.join(", ")
                ),
            )
        })
    }

    /// Keep the rows where `mask` is `true`.
    pub fn filter(&self, mask: &[bool]) -> EventTable {
        let columns = self
            .columns
            .iter()
            .map(|col| {
                col.iter()
                    .zip(mask.iter())
                    .filter_map(|(v, keep)| keep.then_some(*v))
                    .collect()
            })
            .collect();
        EventTable {
            channels: self.channels.clone(),
            columns,
        }
    }

    /// Apply the hyperlog transform to the listed channels.
    ///
    /// Channels missing from this table are skipped (not every export carries
    /// every detector); returns the names that were transformed.
    pub fn apply_hlog(&mut self, channels: &[String], b: f64) -> Vec<String> {
        let mut done = Vec::new();
        for name in channels {
            if let Some(idx) = self.channels.iter().position(|c| c == name) {
                hlog_in_place(&mut self.columns[idx], b);
                done.push(name.clone());
            }
        }
        done
    }
}

/// Min/max over `tables` on channels `x` and `y`, floored/ceiled to `ROUND_INTERVAL`.
pub fn sample_bounds(tables: &[EventTable], x: &str, y: &str) -> Result<SampleBounds, AppError> {
    let mut b = SampleBounds {
        x_min: f64::INFINITY,
        x_max: f64::NEG_INFINITY,
        y_min: f64::INFINITY,
        y_max: f64::NEG_INFINITY,
    };
    for table in tables {
        for &v in table.column(x)?.iter().filter(|v| v.is_finite()) {
            b.x_min = b.x_min.min(v);
            b.x_max = b.x_max.max(v);
        }
        for &v in table.column(y)?.iter().filter(|v| v.is_finite()) {
            b.y_min = b.y_min.min(v);
            b.y_max = b.y_max.max(v);
        }
    }
    if !(b.x_min.is_finite() && b.y_min.is_finite()) {
        return Err(AppError::new(
            2,
            format!("No finite events on '{x}'/'{y}' to compute bounds from"),
        ));
    }

    Ok(SampleBounds {
        x_min: (b.x_min / ROUND_INTERVAL).floor() * ROUND_INTERVAL,
        x_max: (b.x_max / ROUND_INTERVAL).ceil() * ROUND_INTERVAL,
        y_min: (b.y_min / ROUND_INTERVAL).floor() * ROUND_INTERVAL,
        y_max: (b.y_max / ROUND_INTERVAL).ceil() * ROUND_INTERVAL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EventTable {
        EventTable::new(
            vec!["FSC-H".to_string(), "PE-A".to_string()],
            vec![vec![1.0, 12.0, 33.0], vec![-3.0, 7.0, 101.0]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = EventTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn filter_keeps_masked_rows_in_every_column() {
        let t = table().filter(&[true, false, true]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("FSC-H").unwrap(), &[1.0, 33.0]);
        assert_eq!(t.column("PE-A").unwrap(), &[-3.0, 101.0]);
    }

    #[test]
    fn missing_channel_lists_available() {
        let err = table().column("SSC-H").unwrap_err();
        assert!(err.to_string().contains("FSC-H, PE-A"));
    }

    #[test]
    fn bounds_round_outward() {
        let b = sample_bounds(&[table()], "FSC-H", "PE-A").unwrap();
        assert_eq!(b.x_min, 0.0);
        assert_eq!(b.x_max, 35.0);
        assert_eq!(b.y_min, -5.0);
        assert_eq!(b.y_max, 105.0);
    }

    #[test]
    fn bounds_without_finite_events_are_an_input_error() {
        let empty = EventTable::new(
            vec!["FSC-H".to_string(), "PE-A".to_string()],
            vec![Vec::new(), Vec::new()],
        )
        .unwrap();
        let err = sample_bounds(&[empty], "FSC-H", "PE-A").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(table().has_channel("PE-A"));
        assert!(!table().has_channel("SSC-H"));
    }

    #[test]
    fn hlog_skips_missing_channels() {
        let mut t = table();
        let done = t.apply_hlog(&["PE-A".to_string(), "SSC-W".to_string()], 100.0);
        assert_eq!(done, vec!["PE-A".to_string()]);
        assert_eq!(t.column("FSC-H").unwrap()[0], 1.0);
        assert!(t.column("PE-A").unwrap()[2] > 101.0);
    }
}
