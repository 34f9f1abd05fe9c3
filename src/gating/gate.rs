//! Gate definitions (serde-tagged so manifests can list them directly).

use serde::{Deserialize, Serialize};

use crate::data::EventTable;
use crate::error::AppError;
use crate::gating::polygon::Polygon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdRegion {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolygonRegion {
    #[default]
    In,
    Out,
}

/// A filter selecting events within a region of channel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Gate {
    /// Keeps events strictly above / strictly below `value` on `channel`.
    Threshold {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        channel: String,
        value: f64,
        region: ThresholdRegion,
    },
    /// Keeps events inside (boundary included) or outside a polygon.
    Polygon {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        x_channel: String,
        y_channel: String,
        vertices: Polygon,
        #[serde(default)]
        region: PolygonRegion,
    },
}

impl Gate {
    /// Label used in gate-count tables.
    pub fn label(&self) -> String {
        match self {
            Gate::Threshold {
                name: Some(n), ..
            }
            | Gate::Polygon {
                name: Some(n), ..
            } => n.clone(),
            Gate::Threshold {
                channel,
                value,
                region,
                ..
            } => {
                let op = match region {
                    ThresholdRegion::Above => ">",
                    ThresholdRegion::Below => "<",
                };
                format!("{channel} {op} {value}")
            }
            Gate::Polygon {
                x_channel,
                y_channel,
                region,
                ..
            } => {
                let r = match region {
                    PolygonRegion::In => "in",
                    PolygonRegion::Out => "out",
                };
                format!("{x_channel}/{y_channel} polygon ({r})")
            }
        }
    }

    /// Channels this gate reads.
    pub fn channels(&self) -> Vec<&str> {
        match self {
            Gate::Threshold { channel, .. } => vec![channel.as_str()],
            Gate::Polygon {
                x_channel,
                y_channel,
                ..
            } => vec![x_channel.as_str(), y_channel.as_str()],
        }
    }

    /// Per-event membership mask.
    pub fn mask(&self, events: &EventTable) -> Result<Vec<bool>, AppError> {
        match self {
            Gate::Threshold {
                channel,
                value,
                region,
                ..
            } => {
                let col = events.column(channel)?;
                Ok(match region {
                    ThresholdRegion::Above => col.iter().map(|v| *v > *value).collect(),
                    ThresholdRegion::Below => col.iter().map(|v| *v < *value).collect(),
                })
            }
            Gate::Polygon {
                x_channel,
                y_channel,
                vertices,
                region,
                ..
            } => {
                let xs = events.column(x_channel)?;
                let ys = events.column(y_channel)?;
                Ok(xs
                    .iter()
                    .zip(ys.iter())
                    .map(|(&x, &y)| {
                        let inside = vertices.contains(x, y);
                        match region {
                            PolygonRegion::In => inside,
                            PolygonRegion::Out => !inside && x.is_finite() && y.is_finite(),
                        }
                    })
                    .collect())
            }
        }
    }

    /// Events passing this gate.
    pub fn apply(&self, events: &EventTable) -> Result<EventTable, AppError> {
        let mask = self.mask(events)?;
        Ok(events.filter(&mask))
    }
}
