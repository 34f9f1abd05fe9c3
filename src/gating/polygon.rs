//! Polygon geometry for two-channel gates.

use serde::{Deserialize, Serialize};

use crate::data::SampleBounds;
use crate::domain::ROUND_INTERVAL;
use crate::error::AppError;
use crate::math::round_to;

/// Closed polygon in channel space; the closing edge is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Polygon {
    vertices: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn new(mut vertices: Vec<[f64; 2]>) -> Result<Self, AppError> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(AppError::new(
                2,
                format!("Polygon gate needs >= 3 vertices, got {}", vertices.len()),
            ));
        }
        if vertices.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AppError::new(2, "Polygon gate has non-finite vertices"));
        }
        Ok(Self { vertices })
    }

    /// Starting polygon: `num_points` vertices on an ellipse centred in `bounds`
    /// with radii of a quarter of each span, snapped to `ROUND_INTERVAL`.
    pub fn initial(num_points: usize, bounds: &SampleBounds) -> Result<Self, AppError> {
        let cx = (bounds.x_min + bounds.x_max) / 2.0;
        let cy = (bounds.y_min + bounds.y_max) / 2.0;
        let rx = (bounds.x_max - bounds.x_min) / 4.0;
        let ry = (bounds.y_max - bounds.y_min) / 4.0;

        let vertices = (0..num_points)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI / num_points as f64 * i as f64;
                [
                    round_to(cx + rx * t.cos(), ROUND_INTERVAL),
                    round_to(cy + ry * t.sin(), ROUND_INTERVAL),
                ]
            })
            .collect();
        Self::new(vertices)
    }

    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.vertices
    }

    /// Even-odd point-in-polygon. Boundary counts as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        let n = self.vertices.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];

            if point_on_segment(x, y, a, b) {
                return true;
            }

            let ([x1, y1], [x2, y2]) = (a, b);
            // Half-open rule avoids double-counting vertices.
            if (y1 <= y && y2 > y) || (y2 <= y && y1 > y) {
                let x_int = x1 + (y - y1) * (x2 - x1) / (y2 - y1);
                if x_int > x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

impl TryFrom<Vec<[f64; 2]>> for Polygon {
    type Error = AppError;

    fn try_from(vertices: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        Polygon::new(vertices)
    }
}

impl From<Polygon> for Vec<[f64; 2]> {
    fn from(p: Polygon) -> Self {
        p.vertices
    }
}

fn point_on_segment(px: f64, py: f64, [x1, y1]: [f64; 2], [x2, y2]: [f64; 2]) -> bool {
    let scale = (x2 - x1).abs().max((y2 - y1).abs()).max(1.0);
    let cross = (px - x1) * (y2 - y1) - (py - y1) * (x2 - x1);
    if cross.abs() > 1e-12 * scale * scale {
        return false;
    }
    let dot = (px - x1) * (px - x2) + (py - y1) * (py - y2);
    dot <= 0.0
}
