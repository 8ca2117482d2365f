//! Figures drawn with plotters.
//!
//! Every figure implements [`Figure`], which draws on any drawing backend;
//! [`save_figure`] picks SVG or bitmap output from the file extension.
//! SED axes carry log10 values on linear coordinates and label ticks as
//! powers of ten.

use std::ops::Range;
use std::path::Path;

use log::info;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{BlazarError, Result};

pub mod envelope;
pub mod mcmc;
pub mod sed;

pub use envelope::{EnvelopeFigure, EnvelopeLinesFigure, ResidualFigure};
pub use mcmc::{ChainFigure, ChiSquaredFigure, ChiSquaredKind, CornerFigure};
pub use sed::{DataFigure, ModelAndDataFigure, ModelFigure, SedFigure};

pub trait Figure {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()>;
}

pub fn save_figure<F: Figure>(figure: &F, path: &Path, size: (u32, u32)) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| BlazarError::io(dir, e))?;
        }
    }
    let is_svg = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    if is_svg {
        let root = SVGBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        figure.draw(&root)?;
        root.present()?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        figure.draw(&root)?;
        root.present()?;
    }
    info!("✓ wrote {}", path.display());
    Ok(())
}

/// matplotlib's tab10 cycle.
pub const TAB10: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub fn tab10(index: usize) -> RGBColor {
    TAB10[index % TAB10.len()]
}

pub const BAND_COLOR: RGBColor = RGBColor(31, 119, 180);
pub const BEST_COLOR: RGBColor = RGBColor(0, 128, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Triangle,
    Square,
    Cross,
    Diamond,
}

impl Marker {
    const CYCLE: [Marker; 5] = [
        Marker::Circle,
        Marker::Triangle,
        Marker::Square,
        Marker::Diamond,
        Marker::Cross,
    ];

    pub fn pick(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }
}

/// Draw one data marker at `(x, y)` in chart coordinates.
pub fn draw_marker<DB: DrawingBackend>(
    chart: &mut Chart2d<'_, DB>,
    marker: Marker,
    (x, y): (f64, f64),
    size: i32,
    color: RGBColor,
) -> Result<()> {
    let style = color.filled();
    match marker {
        Marker::Circle => {
            chart.draw_series(std::iter::once(Circle::new((x, y), size, style)))?;
        }
        Marker::Triangle => {
            chart.draw_series(std::iter::once(TriangleMarker::new((x, y), size + 1, style)))?;
        }
        Marker::Square => {
            chart.draw_series(std::iter::once(EmptyElement::at((x, y)) + Rectangle::new([(-size, -size), (size, size)], style)))?;
        }
        Marker::Diamond => {
            chart.draw_series(std::iter::once(
                EmptyElement::at((x, y)) + Polygon::new(vec![(0, -size - 1), (size + 1, 0), (0, size + 1), (-size - 1, 0)], style),
            ))?;
        }
        Marker::Cross => {
            chart.draw_series(std::iter::once(Cross::new((x, y), size, color.stroke_width(2))))?;
        }
    }
    Ok(())
}

/// Vertical line from `y0` to `y1` drawn as dashes of `dash` length.
pub fn dashed_vertical(x: f64, y0: f64, y1: f64, dashes: usize) -> Vec<Vec<(f64, f64)>> {
    let step = (y1 - y0) / (2 * dashes.max(1)) as f64;
    (0..dashes.max(1))
        .map(|i| {
            let start = y0 + 2.0 * i as f64 * step;
            vec![(x, start), (x, start + step)]
        })
        .collect()
}

/// Horizontal counterpart of [`dashed_vertical`].
pub fn dashed_horizontal(y: f64, x0: f64, x1: f64, dashes: usize) -> Vec<Vec<(f64, f64)>> {
    dashed_vertical(0.0, x0, x1, dashes)
        .into_iter()
        .map(|seg| seg.into_iter().map(|(_, x)| (x, y)).collect())
        .collect()
}

/// Every other segment of a polyline, which reads as a dashed curve.
pub fn dashed_polyline(points: &[(f64, f64)]) -> Vec<Vec<(f64, f64)>> {
    points
        .windows(2)
        .step_by(2)
        .map(|w| w.to_vec())
        .collect()
}

/// Points of a curve inside the x range, with y clamped to the y range.
pub fn clip(points: impl IntoIterator<Item = (f64, f64)>, x: (f64, f64), y: (f64, f64)) -> Vec<(f64, f64)> {
    points
        .into_iter()
        .filter(|(px, py)| px.is_finite() && py.is_finite() && *px >= x.0 && *px <= x.1)
        .map(|(px, py)| (px, py.clamp(y.0, y.1)))
        .collect()
}

/// Mesh with power-of-ten tick labels on both axes.
pub fn configure_log_mesh<DB: DrawingBackend>(
    chart: &mut Chart2d<'_, DB>,
    x_desc: Option<&str>,
    y_desc: &str,
) -> Result<()> {
    let mut mesh = chart.configure_mesh();
    mesh.y_desc(y_desc)
        .x_label_formatter(&pow10_label)
        .y_label_formatter(&pow10_label)
        .label_style(("sans-serif", 18));
    if let Some(x_desc) = x_desc {
        mesh.x_desc(x_desc);
    }
    mesh.draw()?;
    Ok(())
}

/// `lo..hi` for a chart axis. plotters does not terminate on non-finite
/// bounds, so those are rejected along with empty ranges.
pub fn axis_range((lo, hi): (f64, f64)) -> Result<Range<f64>> {
    if lo.is_finite() && hi.is_finite() && lo < hi {
        Ok(lo..hi)
    } else {
        Err(BlazarError::Plot(format!("invalid axis range [{lo}, {hi}]")))
    }
}

/// Chart type every figure in this crate draws into.
pub type Chart2d<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Tick label for an axis holding log10 values.
pub fn pow10_label(v: &f64) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("1e{}", v.round() as i64)
    } else {
        format!("{:.1e}", 10f64.powf(*v))
    }
}

/// Finite min/max of `values` with a fractional pad; falls back to `[0, 1]`.
pub fn padded_range(values: impl IntoIterator<Item = f64>, pad: f64) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let span = if hi > lo { hi - lo } else { lo.abs().max(1.0) };
    (lo - span * pad, hi + span * pad)
}

/// Draw `figure` into an in-memory SVG document.
#[cfg(test)]
pub(crate) fn render_svg<F: Figure>(figure: &F) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (800, 600)).into_drawing_area();
        root.fill(&WHITE)?;
        figure.draw(&root)?;
        root.present()?;
    }
    Ok(svg)
}
