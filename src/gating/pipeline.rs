//! Sequential gating followed by the readout median.

use crate::data::EventTable;
use crate::domain::GateCount;
use crate::error::AppError;
use crate::gating::gate::Gate;
use crate::math::median;

#[derive(Debug, Clone, PartialEq)]
pub struct GatingPipeline {
    pub gates: Vec<Gate>,
    /// Channel whose median is the binding readout.
    pub readout: String,
    /// Fewer surviving events than this yields no median.
    pub min_events: usize,
}

/// Result of running one well's events through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedWell {
    pub total_events: usize,
    pub gate_counts: Vec<GateCount>,
    pub median: Option<f64>,
}

impl GatingPipeline {
    pub fn new(gates: Vec<Gate>, readout: impl Into<String>, min_events: usize) -> Self {
        Self {
            gates,
            readout: readout.into(),
            min_events,
        }
    }

    /// Check every channel the pipeline reads exists in `events`.
    pub fn validate_channels(&self, events: &EventTable) -> Result<(), AppError> {
        let wanted = self
            .gates
            .iter()
            .flat_map(Gate::channels)
            .chain(std::iter::once(self.readout.as_str()));
        let mut missing: Vec<&str> = Vec::new();
        for ch in wanted {
            if !events.has_channel(ch) && !missing.contains(&ch) {
                missing.push(ch);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(AppError::new(
            2,
            format!(
                "Channel(s) not found: {}. Available: {}",
                missing.join(", "),
                events.channels().join(", ")
            ),
        ))
    }

    /// Apply every gate in order, then reduce the readout channel to its median.
    pub fn run(&self, events: &EventTable) -> Result<GatedWell, AppError> {
        self.validate_channels(events)?;

        let total_events = events.len();
        let mut gate_counts = Vec::with_capacity(self.gates.len());
        let mut current = events.clone();
        for gate in &self.gates {
            current = gate.apply(&current)?;
            log::trace!("gate '{}': {} events remain", gate.label(), current.len());
            gate_counts.push(GateCount {
                gate: gate.label(),
                remaining: current.len(),
            });
        }

        let remaining = current.len();
        let median = if remaining == 0 || remaining < self.min_events {
            None
        } else {
            median(current.column(&self.readout)?)
        };

        Ok(GatedWell {
            total_events,
            gate_counts,
            median,
        })
    }
}
