//! Sampler diagnostics: corner plot, walker traces and χ² by step.

use ndarray::{ArrayView2, ArrayView3, Axis};
use plotters::coord::Shift;
use plotters::prelude::*;

use super::{axis_range, dashed_horizontal, dashed_vertical, padded_range, Figure};
use crate::error::Result;

fn blank_label(_: &f64) -> String {
    String::new()
}

/// Bin counts over `[lo, hi]`; values outside the range are dropped and
/// `hi` itself lands in the last bin.
pub fn histogram(values: impl IntoIterator<Item = f64>, (lo, hi): (f64, f64), bins: usize) -> Vec<usize> {
    let mut counts = vec![0; bins];
    for v in values {
        if let Some(b) = bin_index(v, lo, hi, bins) {
            counts[b] += 1;
        }
    }
    counts
}

/// Row-major `bins × bins` counts, rows following `y`.
pub fn histogram2d(
    points: impl IntoIterator<Item = (f64, f64)>,
    x_range: (f64, f64),
    y_range: (f64, f64),
    bins: usize,
) -> Vec<Vec<usize>> {
    let mut counts = vec![vec![0; bins]; bins];
    for (x, y) in points {
        let bx = bin_index(x, x_range.0, x_range.1, bins);
        let by = bin_index(y, y_range.0, y_range.1, bins);
        if let (Some(bx), Some(by)) = (bx, by) {
            counts[by][bx] += 1;
        }
    }
    counts
}

fn bin_index(v: f64, lo: f64, hi: f64, bins: usize) -> Option<usize> {
    if !(v >= lo && v <= hi) || bins == 0 || hi <= lo {
        return None;
    }
    let b = ((v - lo) / (hi - lo) * bins as f64) as usize;
    Some(b.min(bins - 1))
}

/// Marginal and pairwise posterior distributions.
pub struct CornerFigure<'a> {
    /// Flattened samples after burn-in, one row per sample.
    pub samples: ArrayView2<'a, f64>,
    pub labels: Vec<String>,
    pub best: &'a [f64],
    /// One-sigma minimum and maximum per dimension.
    pub sigma_min: &'a [f64],
    pub sigma_max: &'a [f64],
    /// Axis range per dimension; sample extent when absent.
    pub ranges: Option<&'a [[f64; 2]]>,
    pub bins: usize,
}

impl CornerFigure<'_> {
    pub fn range(&self, dim: usize) -> (f64, f64) {
        if let Some(r) = self.ranges.and_then(|r| r.get(dim)) {
            return (r[0], r[1]);
        }
        let column = self.samples.column(dim);
        let lo = column.iter().copied().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min);
        let hi = column.iter().copied().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max);
        if lo < hi {
            (lo, hi)
        } else {
            padded_range([lo, hi], 0.1)
        }
    }

    /// `name = best (+above/-below)` to three decimals.
    pub fn title(&self, dim: usize) -> String {
        let best = self.best[dim];
        format!(
            "{} = {:.3} (+{:.3}/-{:.3})",
            self.labels[dim],
            best,
            self.sigma_max[dim] - best,
            best - self.sigma_min[dim]
        )
    }

    fn draw_marginal<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, dim: usize, last_row: bool) -> Result<()> {
        let range = self.range(dim);
        let counts = histogram(self.samples.column(dim).iter().copied(), range, self.bins);
        let peak = counts.iter().copied().max().unwrap_or(0).max(1) as f64;
        let width = (range.1 - range.0) / self.bins as f64;

        let mut chart = ChartBuilder::on(area)
            .margin(4)
            .caption(self.title(dim), ("sans-serif", 13))
            .x_label_area_size(if last_row { 40 } else { 4 })
            .y_label_area_size(4)
            .build_cartesian_2d(axis_range(range)?, 0.0..peak * 1.1)?;
        let mut mesh = chart.configure_mesh();
        mesh.disable_mesh()
            .x_labels(4)
            .y_labels(0)
            .y_label_formatter(&blank_label)
            .label_style(("sans-serif", 11));
        if last_row {
            mesh.x_desc(self.labels[dim].as_str());
        } else {
            mesh.x_label_formatter(&blank_label);
        }
        mesh.draw()?;

        chart.draw_series(counts.iter().enumerate().filter(|(_, c)| **c > 0).map(|(i, c)| {
            let x0 = range.0 + i as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, *c as f64)], BLACK.stroke_width(1))
        }))?;

        let top = peak * 1.1;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(self.best[dim], 0.0), (self.best[dim], top)],
            RED.stroke_width(2),
        )))?;
        for x in [self.sigma_min[dim], self.sigma_max[dim]] {
            chart.draw_series(
                dashed_vertical(x, 0.0, top, 12)
                    .into_iter()
                    .map(|seg| PathElement::new(seg, BLUE.stroke_width(1))),
            )?;
        }
        Ok(())
    }

    fn draw_joint<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        row: usize,
        col: usize,
        last_row: bool,
    ) -> Result<()> {
        let x_range = self.range(col);
        let y_range = self.range(row);
        let points = self
            .samples
            .axis_iter(Axis(0))
            .map(|sample| (sample[col], sample[row]));
        let counts = histogram2d(points, x_range, y_range, self.bins);
        let peak = counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
        let wx = (x_range.1 - x_range.0) / self.bins as f64;
        let wy = (y_range.1 - y_range.0) / self.bins as f64;

        let mut chart = ChartBuilder::on(area)
            .margin(4)
            .x_label_area_size(if last_row { 40 } else { 4 })
            .y_label_area_size(if col == 0 { 50 } else { 4 })
            .build_cartesian_2d(axis_range(x_range)?, axis_range(y_range)?)?;
        let mut mesh = chart.configure_mesh();
        mesh.disable_mesh().x_labels(4).y_labels(4).label_style(("sans-serif", 11));
        if last_row {
            mesh.x_desc(self.labels[col].as_str());
        } else {
            mesh.x_label_formatter(&blank_label);
        }
        if col == 0 {
            mesh.y_desc(self.labels[row].as_str());
        } else {
            mesh.y_label_formatter(&blank_label);
        }
        mesh.draw()?;

        chart.draw_series(counts.iter().enumerate().flat_map(|(by, row_counts)| {
            row_counts.iter().enumerate().filter(|(_, c)| **c > 0).map(move |(bx, c)| {
                let x0 = x_range.0 + bx as f64 * wx;
                let y0 = y_range.0 + by as f64 * wy;
                let shade = 0.1 + 0.85 * (*c as f64 / peak);
                Rectangle::new([(x0, y0), (x0 + wx, y0 + wy)], BLACK.mix(shade).filled())
            })
        }))?;

        let (bx, by) = (self.best[col], self.best[row]);
        let crosshair = dashed_vertical(bx, y_range.0, y_range.1, 20)
            .into_iter()
            .chain(dashed_horizontal(by, x_range.0, x_range.1, 20));
        chart.draw_series(crosshair.map(|seg| PathElement::new(seg, RED.stroke_width(1))))?;
        Ok(())
    }
}

impl Figure for CornerFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let dims = self.samples.ncols();
        let panels = root.split_evenly((dims, dims));
        for row in 0..dims {
            for col in 0..=row {
                let area = &panels[row * dims + col];
                let last_row = row + 1 == dims;
                if row == col {
                    self.draw_marginal(area, row, last_row)?;
                } else {
                    self.draw_joint(area, row, col, last_row)?;
                }
            }
        }
        Ok(())
    }
}

/// Walker traces, one panel per parameter.
pub struct ChainFigure<'a> {
    /// steps × walkers × dims
    pub chain: ArrayView3<'a, f64>,
    pub labels: Vec<String>,
}

impl Figure for ChainFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let (steps, walkers, dims) = self.chain.dim();
        let panels = root.split_evenly((dims, 1));
        for (dim, area) in panels.iter().enumerate() {
            let trace = self.chain.index_axis(Axis(2), dim);
            let y = padded_range(trace.iter().copied(), 0.05);
            let last = dim + 1 == dims;

            let mut chart = ChartBuilder::on(area)
                .margin(4)
                .x_label_area_size(if last { 40 } else { 4 })
                .y_label_area_size(70)
                .build_cartesian_2d(axis_range((0.0, steps as f64))?, axis_range(y)?)?;
            let mut mesh = chart.configure_mesh();
            mesh.disable_mesh()
                .y_desc(self.labels.get(dim).map(String::as_str).unwrap_or(""))
                .y_labels(3)
                .label_style(("sans-serif", 12));
            if last {
                mesh.x_desc("step number");
            } else {
                mesh.x_label_formatter(&blank_label);
            }
            mesh.draw()?;

            for walker in 0..walkers {
                let line = trace
                    .column(walker)
                    .iter()
                    .enumerate()
                    .map(|(step, v)| (step as f64, *v))
                    .collect::<Vec<_>>();
                chart.draw_series(LineSeries::new(line, BLACK.mix(0.3)))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChiSquaredKind {
    /// Mean over walkers.
    #[default]
    Avg,
    /// Minimum over walkers.
    Best,
    /// Every walker.
    All,
}

impl ChiSquaredKind {
    pub const ALL: [ChiSquaredKind; 3] = [ChiSquaredKind::Avg, ChiSquaredKind::Best, ChiSquaredKind::All];

    pub fn file_stem(self) -> &'static str {
        match self {
            ChiSquaredKind::Avg => "avg_chi_squared_plot",
            ChiSquaredKind::Best => "best_chi_squared_plot",
            ChiSquaredKind::All => "all_chi_squared_plot",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ChiSquaredKind::Avg => "Average χ² by Step",
            ChiSquaredKind::Best => "Best χ² by Step",
            ChiSquaredKind::All => "χ² by Step",
        }
    }
}

/// Curves to draw for `kind`: a single curve for `Avg`/`Best`, one per
/// walker for `All`. Non-finite values are skipped in the reductions.
pub fn chi_squared_series(chi_sq: ArrayView2<f64>, kind: ChiSquaredKind) -> Vec<Vec<f64>> {
    let finite = |row: ndarray::ArrayView1<f64>| row.iter().copied().filter(|v| v.is_finite()).collect::<Vec<_>>();
    match kind {
        ChiSquaredKind::Avg => vec![chi_sq
            .axis_iter(Axis(0))
            .map(|row| {
                let values = finite(row);
                if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            })
            .collect()],
        ChiSquaredKind::Best => vec![chi_sq
            .axis_iter(Axis(0))
            .map(|row| finite(row).into_iter().fold(f64::NAN, f64::min))
            .collect()],
        ChiSquaredKind::All => chi_sq.axis_iter(Axis(1)).map(|walker| walker.to_vec()).collect(),
    }
}

/// χ² against step number, starting at the burn-in cut.
pub struct ChiSquaredFigure<'a> {
    /// steps × walkers, after burn-in
    pub chi_squared: ArrayView2<'a, f64>,
    pub kind: ChiSquaredKind,
    pub discard: usize,
    pub title: Option<String>,
}

impl Figure for ChiSquaredFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let series = chi_squared_series(self.chi_squared, self.kind);
        let steps = self.chi_squared.nrows();
        let x0 = self.discard as f64;
        let y = padded_range(series.iter().flatten().copied(), 0.05);
        let title = self.title.as_deref().unwrap_or(self.kind.title());

        let mut chart = ChartBuilder::on(root)
            .margin(12)
            .caption(title, ("sans-serif", 28))
            .x_label_area_size(60)
            .y_label_area_size(90)
            .build_cartesian_2d(axis_range((x0, x0 + steps as f64))?, axis_range(y)?)?;
        chart
            .configure_mesh()
            .x_desc("step")
            .y_desc("χ²")
            .label_style(("sans-serif", 18))
            .draw()?;

        for (i, curve) in series.iter().enumerate() {
            let color = if self.kind == ChiSquaredKind::All {
                super::tab10(i)
            } else {
                super::tab10(0)
            };
            let points = curve
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(step, v)| (x0 + step as f64, *v))
                .collect::<Vec<_>>();
            chart.draw_series(LineSeries::new(points, color.mix(0.6).stroke_width(1)))?;
        }
        Ok(())
    }
}
