//! Ratatui-based terminal viewer for saved fit files.
//!
//! The left pane lists the titrations; the right pane shows the selected
//! titration's medians and fitted curve (log10 concentration axis) above its
//! parameters and per-well table.

use std::io;
use std::path::Path;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Terminal,
};

use crate::domain::{FitFile, TitrationRecord};
use crate::error::AppError;
use crate::io::read_fit_json;
use crate::models::predict;

mod plotters_chart;

use plotters_chart::BindingPlottersChart;

/// Start the TUI on a fit JSON file.
pub fn run(fit_path: &Path) -> Result<(), AppError> {
    // Load before touching the terminal so errors print normally.
    let fit_file = read_fit_json(fit_path)?;
    if fit_file.titrations.is_empty() {
        return Err(AppError::new(2, "Fit file contains no titrations."));
    }

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(fit_file, fit_path.display().to_string());
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    fit_file: FitFile,
    source: String,
    selected: usize,
    show_wells: bool,
    status: String,
}

impl App {
    fn new(fit_file: FitFile, source: String) -> Self {
        let fitted = fit_file.titrations.iter().filter(|t| t.fit.is_some()).count();
        let status = format!("{fitted}/{} titrations fitted", fit_file.titrations.len());
        Self {
            fit_file,
            source,
            selected: 0,
            show_wells: true,
            status,
        }
    }

    fn current(&self) -> Option<&TitrationRecord> {
        self.fit_file.titrations.get(self.selected)
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the viewer should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let last = self.fit_file.titrations.len().saturating_sub(1);
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.selected = (self.selected + 1).min(last),
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = last,
            KeyCode::Char('w') => {
                self.show_wells = !self.show_wells;
                self.status = if self.show_wells { "wells shown" } else { "wells hidden" }.to_string();
                return false;
            }
            _ => return false,
        }
        if let Some(rec) = self.current() {
            self.status = match (&rec.fit, &rec.error) {
                (Some(f), _) => format!("{}: kd={:.4}", rec.name, f.params.kd),
                (None, Some(e)) => format!("{}: {e}", rec.name),
                (None, None) => format!("{}: not fitted", rec.name),
            };
        }
        false
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let lines = vec![
            Line::from(vec![
                Span::styled("kdfit", Style::default().fg(Color::Cyan)),
                Span::raw(format!(" - {}", self.source)),
            ]),
            Line::from(Span::styled(
                format!(
                    "readout: {} | generated: {} | titrations: {}",
                    self.fit_file.readout,
                    self.fit_file.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    self.fit_file.titrations.len()
                ),
                Style::default().fg(Color::Gray),
            )),
        ];
        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(area);
        self.draw_list(frame, cols[0]);

        let detail_height = if self.show_wells {
            self.current().map(|r| r.wells.len() as u16 + 5).unwrap_or(5).min(area.height / 2)
        } else {
            5
        };
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(detail_height)])
            .split(cols[1]);
        self.draw_chart(frame, rows[0]);
        self.draw_details(frame, rows[1]);
    }

    fn draw_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .fit_file
            .titrations
            .iter()
            .map(|t| {
                let (mark, color) = if t.fit.is_some() {
                    ("✓", Color::Green)
                } else {
                    ("✗", Color::Red)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(mark, Style::default().fg(color)),
                    Span::raw(format!(" {}", t.name)),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Titrations").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = self
            .current()
            .map(|r| format!("Binding curve: {}", r.name))
            .unwrap_or_else(|| "Binding curve".to_string());
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(series) = self.current().and_then(chart_series) else {
            let msg = Paragraph::new("No positive-concentration medians to plot.")
                .style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let (chart_rect, insets) = chart_layout(inner);
        let y_label = format!("{} median", self.fit_file.readout);
        let widget = BindingPlottersChart {
            curve: &series.curve,
            points: &series.points,
            kd_marker: series.kd_marker,
            x_bounds: series.x_bounds,
            y_bounds: series.y_bounds,
            x_label: "log10 conc",
            y_label: y_label.clone(),
            fmt_x: fmt_axis_x,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, series.x_bounds, series.y_bounds, &y_label);
        }
    }

    fn draw_details(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(rec) = self.current() else {
            return;
        };
        let mut lines: Vec<Line> = Vec::new();
        match (&rec.fit, &rec.error) {
            (Some(f), _) => {
                let se = f
                    .stderr
                    .kd
                    .map(|s| format!(" ± {s:.4}"))
                    .unwrap_or_default();
                lines.push(Line::from(Span::styled(
                    format!("kd = {:.4}{se}{}", f.params.kd, if f.kd_at_bound { " (at bound)" } else { "" }),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(format!(
                    "sat = {:.2} | init = {:.2} | chisqr = {:.4e} | r2 = {:.4} | n = {} | iter = {}",
                    f.params.sat, f.params.init, f.chisqr, f.r_squared, f.n_points, f.iterations
                )));
            }
            (None, err) => lines.push(Line::from(Span::styled(
                format!("fit failed: {}", err.as_deref().unwrap_or("not fitted")),
                Style::default().fg(Color::Red),
            ))),
        }

        if self.show_wells {
            lines.push(Line::from(Span::styled(
                format!("{:<6} {:>12} {:>8} {:>8} {:>12}", "well", "conc", "events", "gated", "median"),
                Style::default().fg(Color::Gray),
            )));
            for w in &rec.wells {
                let median = w.median.map(|m| format!("{m:.2}")).unwrap_or_else(|| "-".to_string());
                lines.push(Line::from(format!(
                    "{:<6} {:>12} {:>8} {:>8} {:>12}",
                    w.stop.well_id(),
                    w.concentration,
                    w.total_events,
                    w.gated_events(),
                    median
                )));
            }
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().title("Fit").borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  Home/End jump  w wells  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Chart data for one titration, x in log10(concentration).
#[derive(Debug, Clone, PartialEq)]
struct ChartSeries {
    curve: Vec<(f64, f64)>,
    points: Vec<(f64, f64)>,
    kd_marker: Option<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

/// Build chart series for Plotters; `None` when nothing can be placed on a log axis.
fn chart_series(rec: &TitrationRecord) -> Option<ChartSeries> {
    let points: Vec<(f64, f64)> = rec
        .wells
        .iter()
        .filter_map(|w| match w.median {
            Some(m) if w.concentration > 0.0 && m.is_finite() => Some((w.concentration.log10(), m)),
            _ => None,
        })
        .collect();

    let mut curve: Vec<(f64, f64)> = rec
        .grid
        .as_ref()
        .map(|g| {
            g.concentration
                .iter()
                .zip(g.response.iter())
                .filter(|(c, y)| **c > 0.0 && y.is_finite())
                .map(|(&c, &y)| (c.log10(), y))
                .collect()
        })
        .unwrap_or_default();

    let xs = points.iter().chain(curve.iter()).map(|&(x, _)| x);
    let (mut x0, mut x1) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
    if !(x0.is_finite() && x1.is_finite()) {
        return None;
    }
    if x1 <= x0 {
        x0 -= 1.0;
        x1 += 1.0;
    }

    // Older fit files may lack a grid; sample the fitted parameters instead.
    if curve.is_empty() {
        if let Some(f) = &rec.fit {
            let n = 200usize;
            curve = (0..n)
                .map(|i| {
                    let x = x0 + (x1 - x0) * i as f64 / (n as f64 - 1.0);
                    (x, predict(&f.params, 10f64.powf(x)))
                })
                .collect();
        }
    }

    let kd_marker = rec.fit.as_ref().and_then(|f| {
        let x = f.params.kd.log10();
        (x.is_finite() && x >= x0 && x <= x1).then(|| (x, f.params.init + f.params.sat / 2.0))
    });

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in points.iter().chain(curve.iter()) {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = if y_min.is_finite() { y_min - 1.0 } else { 0.0 };
        y_max = y_min + 2.0;
    }
    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);

    Some(ChartSeries {
        curve,
        points,
        kd_marker,
        x_bounds: [x0, x1],
        y_bounds: [y_min - pad, y_max + pad],
    })
}

fn fmt_axis_x(v: f64) -> String {
    format!("{v:.1}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.0}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10
        || inner.height <= insets.top + insets.bottom + 5
    {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    y_label: &str,
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_x(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("log10 concentration")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(y_label.to_string())
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: inner.width.min(insets.left.saturating_sub(1) + chart.width),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BindingFit, BindingParams, CurveGrid, StdErrors, TitrationStop, WellSummary};

    fn record(grid: Option<CurveGrid>) -> TitrationRecord {
        let well = |number: u32, concentration: f64, median: f64| WellSummary {
            stop: TitrationStop {
                specimen: 1,
                letter: 'A',
                number,
            },
            concentration,
            total_events: 10,
            gate_counts: Vec::new(),
            median: Some(median),
        };
        TitrationRecord {
            name: "t".to_string(),
            wells: vec![well(1, 100.0, 90.0), well(2, 10.0, 50.0), well(3, 0.0, 1.0)],
            fit: Some(BindingFit {
                params: BindingParams {
                    init: 0.0,
                    sat: 100.0,
                    kd: 10.0,
                },
                stderr: StdErrors::default(),
                chisqr: 0.0,
                redchi: None,
                r_squared: 1.0,
                n_points: 3,
                iterations: 1,
                kd_at_bound: false,
            }),
            error: None,
            grid,
        }
    }

    #[test]
    fn chart_series_drops_zero_concentration_and_marks_kd() {
        let s = chart_series(&record(None)).unwrap();
        assert_eq!(s.points, vec![(2.0, 90.0), (1.0, 50.0)]);
        assert_eq!(s.x_bounds, [1.0, 2.0]);
        assert_eq!(s.kd_marker, Some((1.0, 50.0)));
        assert_eq!(s.curve.len(), 200);
        assert!(s.y_bounds[0] < 50.0 && s.y_bounds[1] > 90.0);
    }

    #[test]
    fn chart_series_prefers_stored_grid() {
        let grid = CurveGrid {
            concentration: vec![1.0, 1000.0],
            response: vec![9.0, 99.0],
        };
        let s = chart_series(&record(Some(grid))).unwrap();
        assert_eq!(s.curve, vec![(0.0, 9.0), (3.0, 99.0)]);
        assert_eq!(s.x_bounds, [0.0, 3.0]);
    }
}
