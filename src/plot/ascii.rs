//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - well medians: `o`
//! - fitted binding curve: `-` line
//!
//! The x-axis is `log10(concentration)`; zero-concentration wells cannot be
//! placed on it and are listed under the plot instead.

use crate::domain::{BindingParams, FitFile, TitrationRecord};
use crate::models::predict;

/// Render one titration: medians plus the fitted curve when there is one.
pub fn render_titration_plot(record: &TitrationRecord, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let points: Vec<(f64, f64)> = record
        .wells
        .iter()
        .filter_map(|w| match w.median {
            Some(m) if w.concentration > 0.0 && m.is_finite() => Some((w.concentration.log10(), m)),
            _ => None,
        })
        .collect();
    let hidden = record
        .wells
        .iter()
        .filter(|w| w.concentration <= 0.0 && w.median.is_some())
        .count();

    let grid_points: Option<Vec<(f64, f64)>> = record.grid.as_ref().map(|g| {
        g.concentration
            .iter()
            .zip(g.response.iter())
            .filter(|(c, y)| **c > 0.0 && y.is_finite())
            .map(|(&c, &y)| (c.log10(), y))
            .collect()
    });

    let x_range = x_range(&points)
        .or_else(|| grid_points.as_deref().and_then(x_range))
        .unwrap_or((-1.0, 3.0));

    let curve = match (&record.fit, grid_points) {
        (_, Some(g)) if !g.is_empty() => Some(g),
        (Some(f), _) => Some(sample_curve(&f.params, x_range.0, x_range.1, width)),
        _ => None,
    };

    let mut out = render_plot(&points, curve.as_deref(), x_range, width, height);
    if hidden > 0 {
        out.push_str(&format!("({hidden} zero-concentration well(s) not shown)\n"));
    }
    out
}

/// Render every titration of a saved fit file.
pub fn render_fit_file_plots(fit_file: &FitFile, width: usize, height: usize) -> String {
    let mut out = String::new();
    for record in &fit_file.titrations {
        out.push_str(&format!("--- {} ---\n", record.name));
        out.push_str(&render_titration_plot(record, width, height));
        out.push('\n');
    }
    out
}

fn render_plot(
    points: &[(f64, f64)],
    curve_points: Option<&[(f64, f64)]>,
    (x_min, x_max): (f64, f64),
    width: usize,
    height: usize,
) -> String {
    // Determine y-range from observed points and curve points.
    let (y_min, y_max) = y_range(points, curve_points).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    if let Some(curve) = curve_points {
        draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max);
    }

    for &(x, y) in points {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: log10(conc)=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.2}, {y_max:.2}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn x_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for &(x, _) in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
    }
    if min_x.is_finite() && max_x.is_finite() && max_x > min_x {
        Some((min_x, max_x))
    } else {
        None
    }
}

fn sample_curve(params: &BindingParams, x_min: f64, x_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let x = x_min + u * (x_max - x_min);
        out.push((x, predict(params, 10f64.powf(x))));
    }
    out
}

fn y_range(points: &[(f64, f64)], curve: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let curve = curve.unwrap_or(&[]);
    for &(_, y) in points.iter().chain(curve.iter()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 0.5, min_y + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if x < x_min || x > x_max {
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, '-');
        } else {
            grid[row][col] = '-';
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
