//! Spectral energy distribution figures: model and data on log-log axes.

use std::collections::HashMap;

use plotters::coord::Shift;
use plotters::prelude::*;

use super::{
    axis_range, clip, configure_log_mesh, dashed_polyline, draw_marker, padded_range, pow10_label, tab10, Chart2d, Figure, Marker,
    BAND_COLOR,
};
use crate::config::ResidualMode;
use crate::data::{instrument_groups, InstrumentGroup};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::models::{Component, ModelSpectrum, SedData, Spectrum};
use crate::residuals::{delta_band, delta_residuals, scale_to_values, sigma_residuals};

/// Planck constant in eV s.
pub const PLANCK_EV: f64 = 4.135667662e-15;

const FREQ_DESC: &str = "Frequency ν (Hz)";
const FLUX_DESC: &str = "νFν (erg cm⁻² s⁻¹)";

/// log10 y range from `scale_to_values` over the data fluxes.
fn data_y_range(data: &SedData, lower: Option<f64>, upper: Option<f64>) -> Option<(f64, f64)> {
    if data.is_empty() {
        return None;
    }
    let (lo, hi) = scale_to_values(&data.nufnu(), lower, upper);
    (lo > 0.0 && hi > lo).then(|| (lo.log10(), hi.log10()))
}

fn log_or(value: f64, floor: f64) -> f64 {
    if value > 0.0 {
        value.log10()
    } else {
        floor
    }
}

fn build_chart<'a, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, Shift>,
    title: &str,
    x: (f64, f64),
    y: (f64, f64),
) -> Result<Chart2d<'a, DB>> {
    Ok(ChartBuilder::on(area)
        .margin(12)
        .caption(title, ("sans-serif", 28))
        .x_label_area_size(60)
        .y_label_area_size(100)
        .build_cartesian_2d(axis_range(x)?, axis_range(y)?)?)
}

pub(super) fn draw_spectrum_line<DB: DrawingBackend>(
    chart: &mut Chart2d<'_, DB>,
    spectrum: &Spectrum,
    x: (f64, f64),
    y: (f64, f64),
    style: ShapeStyle,
    label: Option<&str>,
) -> Result<()> {
    let anno = chart.draw_series(LineSeries::new(clip(spectrum.points(), x, y), style))?;
    if let Some(label) = label {
        anno.label(label)
            .legend(move |(lx, ly)| PathElement::new(vec![(lx, ly), (lx + 20, ly)], style));
    }
    Ok(())
}

/// Error bars, markers and upper-limit arrows for one instrument.
fn draw_group<DB: DrawingBackend>(
    chart: &mut Chart2d<'_, DB>,
    group: &InstrumentGroup<'_>,
    color: RGBColor,
    marker: Marker,
    y_floor: f64,
) -> Result<()> {
    for p in &group.points {
        let x = p.nu.log10();
        let y = p.nufnu.log10();
        if p.nu_err_low > 0.0 || p.nu_err_high > 0.0 {
            let left = log_or(p.nu - p.nu_err_low, x);
            let right = (p.nu + p.nu_err_high).log10();
            chart.draw_series(std::iter::once(PathElement::new(vec![(left, y), (right, y)], color.stroke_width(1))))?;
        }
        let bottom = log_or(p.nufnu - p.err_low, y_floor);
        if p.upper_limit {
            chart.draw_series(std::iter::once(PathElement::new(vec![(x, y), (x, bottom)], color.stroke_width(1))))?;
            chart.draw_series(std::iter::once(
                EmptyElement::at((x, bottom)) + Polygon::new(vec![(-4, -7), (4, -7), (0, 0)], color.filled()),
            ))?;
        } else {
            let top = (p.nufnu + p.err_high).log10();
            chart.draw_series(std::iter::once(PathElement::new(vec![(x, bottom), (x, top)], color.stroke_width(1))))?;
        }
        draw_marker(chart, marker, (x, y), 4, color)?;
    }
    Ok(())
}

/// Legend entry for an instrument without drawing anything.
fn label_group<DB: DrawingBackend>(chart: &mut Chart2d<'_, DB>, label: &str, color: RGBColor) -> Result<()> {
    chart
        .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())?
        .label(label)
        .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    Ok(())
}

/// Data points in a single colour with vertical error bars.
pub(super) fn draw_data_plain<DB: DrawingBackend>(chart: &mut Chart2d<'_, DB>, data: &SedData, y_floor: f64) -> Result<()> {
    chart.draw_series(data.points.iter().map(|p| {
        let x = p.nu.log10();
        let bottom = log_or(p.nufnu - p.err_low, y_floor);
        PathElement::new(vec![(x, bottom), (x, (p.nufnu + p.err_high).log10())], BLACK.stroke_width(1))
    }))?;
    chart
        .draw_series(
            data.points
                .iter()
                .map(|p| Circle::new((p.nu.log10(), p.nufnu.log10()), 3, BAND_COLOR.filled())),
        )?
        .label("Data")
        .legend(|(x, y)| Circle::new((x, y), 3, BAND_COLOR.filled()));
    Ok(())
}

pub(super) fn draw_legend<'a, DB: DrawingBackend + 'a>(
    chart: &mut Chart2d<'a, DB>,
    position: SeriesLabelPosition,
) -> Result<()> {
    chart
        .configure_series_labels()
        .position(position)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;
    Ok(())
}

/// A model spectrum on its own.
pub struct ModelFigure<'a> {
    pub spectrum: &'a Spectrum,
    pub title: Option<String>,
    pub line: bool,
    pub points: bool,
}

impl Figure for ModelFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let x = padded_range(self.spectrum.log_freq.iter().copied(), 0.02);
        let y = padded_range(self.spectrum.log_flux.iter().copied(), 0.05);
        let title = self.title.as_deref().unwrap_or("SED frequency/energy flux plot");
        let mut chart = build_chart(root, title, x, y)?;
        configure_log_mesh(&mut chart, Some(FREQ_DESC), FLUX_DESC)?;

        if self.line {
            draw_spectrum_line(&mut chart, self.spectrum, x, y, BAND_COLOR.stroke_width(2), None)?;
        }
        if self.points {
            chart.draw_series(
                self.spectrum
                    .points()
                    .map(|(px, py)| Circle::new((px, py), 2, BAND_COLOR.filled())),
            )?;
        }
        Ok(())
    }
}

/// Observed SED points with error bars.
pub struct DataFigure<'a> {
    pub data: &'a SedData,
    pub title: Option<String>,
    /// Scale the y axis with `scale_to_values` instead of fitting the bars.
    pub adjust_scale: bool,
    pub lower_adjust_multiplier: Option<f64>,
    pub upper_adjust_multiplier: Option<f64>,
}

impl DataFigure<'_> {
    fn y_range(&self) -> (f64, f64) {
        let scaled = self
            .adjust_scale
            .then(|| data_y_range(self.data, self.lower_adjust_multiplier, self.upper_adjust_multiplier))
            .flatten();
        scaled.unwrap_or_else(|| {
            padded_range(
                self.data.points.iter().flat_map(|p| {
                    [
                        log_or(p.nufnu - p.err_low, p.nufnu.log10()),
                        (p.nufnu + p.err_high).log10(),
                    ]
                }),
                0.05,
            )
        })
    }
}

impl Figure for DataFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let x = padded_range(self.data.points.iter().map(|p| p.nu.log10()), 0.05);
        let y = self.y_range();
        let title = self.title.as_deref().unwrap_or("SED frequency/energy flux plot");
        let mut chart = build_chart(root, title, x, y)?;
        configure_log_mesh(&mut chart, Some(FREQ_DESC), FLUX_DESC)?;
        draw_data_plain(&mut chart, self.data, y.0)?;
        Ok(())
    }
}

/// Model spectrum over the observed data.
pub struct ModelAndDataFigure<'a> {
    pub model: &'a Spectrum,
    pub data: &'a SedData,
    pub title: Option<String>,
    /// Fit the y axis to the data rather than to the model.
    pub adjust_scale: bool,
    pub lower_adjust_multiplier: Option<f64>,
    pub upper_adjust_multiplier: Option<f64>,
    pub line: bool,
    pub points: bool,
}

impl Figure for ModelAndDataFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let x = padded_range(
            self.model
                .log_freq
                .iter()
                .copied()
                .chain(self.data.points.iter().map(|p| p.nu.log10())),
            0.02,
        );
        let scaled = if self.adjust_scale {
            data_y_range(self.data, self.lower_adjust_multiplier, self.upper_adjust_multiplier)
        } else {
            None
        };
        let y = scaled.unwrap_or_else(|| {
            padded_range(
                self.model
                    .log_flux
                    .iter()
                    .copied()
                    .chain(self.data.points.iter().map(|p| p.nufnu.log10())),
                0.05,
            )
        });

        let title = self.title.as_deref().unwrap_or("SED frequency/energy flux plot");
        let mut chart = build_chart(root, title, x, y)?;
        configure_log_mesh(&mut chart, Some(FREQ_DESC), FLUX_DESC)?;

        if self.line {
            draw_spectrum_line(&mut chart, self.model, x, y, BAND_COLOR.stroke_width(2), Some("Model"))?;
        }
        if self.points {
            chart.draw_series(
                clip(self.model.points(), x, y)
                    .into_iter()
                    .map(|(px, py)| Circle::new((px, py), 2, BAND_COLOR.filled())),
            )?;
        }
        draw_data_plain(&mut chart, self.data, y.0)?;
        draw_legend(&mut chart, SeriesLabelPosition::UpperRight)?;
        Ok(())
    }
}

/// Publication figure: data by instrument, best model with its components,
/// the 1-sigma band, an energy axis on top and an optional residual panel.
pub struct SedFigure<'a> {
    pub data: &'a SedData,
    pub best: &'a ModelSpectrum,
    pub envelope: Option<&'a Envelope>,
    pub residual: ResidualMode,
    /// `[nu_min, nu_max, nufnu_min, nufnu_max]`, linear units.
    pub boundaries: Option<[f64; 4]>,
    pub lower_adjust_multiplier: f64,
    pub upper_adjust_multiplier: f64,
    pub title: Option<String>,
}

impl SedFigure<'_> {
    /// Axis limits in log10 units.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        if let Some([x0, x1, y0, y1]) = self.boundaries {
            return ((x0.log10(), x1.log10()), (y0.log10(), y1.log10()));
        }
        let y = data_y_range(
            self.data,
            Some(self.lower_adjust_multiplier),
            Some(self.upper_adjust_multiplier),
        )
        .unwrap_or_else(|| padded_range(self.best.total.log_flux.iter().copied(), 0.1));
        ((5e8f64.log10(), 1e28f64.log10()), y)
    }

    /// Components worth drawing: second-order and external Compton only
    /// when they rise above the bottom of the plot.
    pub fn visible_components(&self, y_min: f64) -> Vec<(Component, &Spectrum)> {
        self.best
            .components
            .iter()
            .filter(|(c, s)| match c {
                Component::SecondOrderCompton | Component::ExternalCompton => s.max_flux() > 10f64.powf(y_min),
                _ => true,
            })
            .map(|(c, s)| (*c, s))
            .collect()
    }

    fn instrument_colors(&self) -> HashMap<&str, (RGBColor, Marker)> {
        let mut colors = HashMap::new();
        for group in instrument_groups(self.data) {
            colors
                .entry(group.instrument)
                .or_insert((tab10(group.index + 1), Marker::pick(group.index)));
        }
        colors
    }

    fn draw_main<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, x: (f64, f64), y: (f64, f64), with_x_desc: bool) -> Result<()> {
        let log_h = PLANCK_EV.log10();
        let mut builder = ChartBuilder::on(area);
        builder
            .margin(12)
            .top_x_label_area_size(50)
            .x_label_area_size(if with_x_desc { 60 } else { 30 })
            .y_label_area_size(100)
            .right_y_label_area_size(20);
        if let Some(title) = &self.title {
            builder.caption(title, ("sans-serif", 28));
        }
        let mut chart = builder
            .build_cartesian_2d(axis_range(x)?, axis_range(y)?)?
            .set_secondary_coord(x.0 + log_h..x.1 + log_h, y.0..y.1);

        configure_log_mesh(&mut *chart, with_x_desc.then_some(FREQ_DESC), FLUX_DESC)?;
        chart
            .configure_secondary_axes()
            .x_desc("Energy (eV)")
            .x_label_formatter(&pow10_label)
            .y_label_formatter(&|_| String::new())
            .draw()?;

        if let Some(envelope) = self.envelope {
            let area = clip(envelope.polygon(), x, y);
            if area.len() >= 3 {
                chart
                    .draw_series(std::iter::once(Polygon::new(area, BAND_COLOR.mix(0.5).filled())))?
                    .label("Within 1σ")
                    .legend(|(lx, ly)| Rectangle::new([(lx, ly - 5), (lx + 20, ly + 5)], BAND_COLOR.mix(0.5).filled()));
            }
        }

        draw_spectrum_line(&mut *chart, &self.best.total, x, y, tab10(1).mix(0.8).stroke_width(2), Some("Best model"))?;

        for (component, spectrum) in self.visible_components(y.0) {
            let (color, dashed) = match component {
                Component::Synchrotron => (BLACK, true),
                Component::SelfCompton => (BLACK, false),
                Component::SecondOrderCompton => (tab10(2), false),
                Component::ExternalCompton => (tab10(3), false),
                Component::Nucleus => (tab10(4), false),
            };
            let style = color.mix(0.5).stroke_width(2);
            if dashed {
                let points = clip(spectrum.points(), x, y);
                chart
                    .draw_series(dashed_polyline(&points).into_iter().map(|seg| PathElement::new(seg, style)))?
                    .label(component.label())
                    .legend(move |(lx, ly)| {
                        PathElement::new(vec![(lx, ly), (lx + 8, ly), (lx + 12, ly), (lx + 20, ly)], style)
                    });
            } else {
                draw_spectrum_line(&mut *chart, spectrum, x, y, style, Some(component.label()))?;
            }
        }

        let colors = self.instrument_colors();
        for group in instrument_groups(self.data) {
            let (color, marker) = colors[group.instrument];
            draw_group(&mut *chart, &group, color, marker, y.0)?;
        }
        let mut labelled: Vec<&str> = Vec::new();
        for group in instrument_groups(self.data) {
            if !labelled.contains(&group.instrument) {
                label_group(&mut *chart, group.instrument, colors[group.instrument].0)?;
                labelled.push(group.instrument);
            }
        }

        draw_legend(&mut *chart, SeriesLabelPosition::UpperMiddle)?;
        Ok(())
    }

    fn draw_residuals<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, x: (f64, f64)) -> Result<()> {
        let points = match self.residual {
            ResidualMode::None => return Ok(()),
            ResidualMode::Sigma => sigma_residuals(self.data, &self.best.total)?,
            ResidualMode::Delta => delta_residuals(self.data, &self.best.total)?,
        };
        let band = match (self.residual, self.envelope) {
            (ResidualMode::Delta, Some(envelope)) => delta_band(&self.best.total, envelope)?,
            _ => Vec::new(),
        };

        let stretch = if self.residual == ResidualMode::Sigma { 1.5 } else { 2.0 };
        let lo = points
            .iter()
            .map(|p| p.value - p.err_low)
            .filter(|v| v.is_finite())
            .fold(-1.0, f64::min);
        let hi = points
            .iter()
            .map(|p| p.value + p.err_high)
            .filter(|v| v.is_finite())
            .fold(1.0, f64::max);
        let y = (lo * stretch, hi * stretch);

        let mut chart = ChartBuilder::on(area)
            .margin(12)
            .x_label_area_size(60)
            .y_label_area_size(100)
            .right_y_label_area_size(20)
            .build_cartesian_2d(axis_range(x)?, axis_range(y)?)?;
        chart
            .configure_mesh()
            .x_desc(FREQ_DESC)
            .y_desc(if self.residual == ResidualMode::Sigma { "Δσ" } else { "Δ/model" })
            .x_label_formatter(&pow10_label)
            .label_style(("sans-serif", 18))
            .y_labels(5)
            .draw()?;

        if !band.is_empty() {
            let mut area: Vec<(f64, f64)> = band.iter().map(|(nu, _, top)| (nu.log10(), *top)).collect();
            area.extend(band.iter().rev().map(|(nu, bottom, _)| (nu.log10(), *bottom)));
            let area = clip(area, x, y);
            if area.len() >= 3 {
                chart.draw_series(std::iter::once(Polygon::new(area, BAND_COLOR.mix(0.3).filled())))?;
            }
        }
        chart.draw_series(LineSeries::new(vec![(x.0, 0.0), (x.1, 0.0)], BLACK.stroke_width(1)))?;

        let colors = self.instrument_colors();
        for p in &points {
            let (color, marker) = colors
                .get(p.instrument.as_str())
                .copied()
                .unwrap_or((BLACK, Marker::Circle));
            let px = p.nu.log10();
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(px, p.value - p.err_low), (px, p.value + p.err_high)],
                color.stroke_width(1),
            )))?;
            draw_marker(&mut chart, marker, (px, p.value), 4, color)?;
        }
        Ok(())
    }
}

impl Figure for SedFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let (x, y) = self.bounds();
        if self.residual == ResidualMode::None {
            return self.draw_main(root, x, y, true);
        }
        let (_, height) = root.dim_in_pixel();
        let (top, bottom) = root.split_vertically((height as f64 * 0.75) as u32);
        self.draw_main(&top, x, y, false)?;
        self.draw_residuals(&bottom, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SedPoint;

    fn data() -> SedData {
        let point = |instrument: &str, nu: f64, nufnu: f64| SedPoint {
            instrument: instrument.into(),
            nu,
            nu_err_low: 0.0,
            nu_err_high: 0.0,
            nufnu,
            err_low: nufnu * 0.1,
            err_high: nufnu * 0.1,
            upper_limit: false,
        };
        SedData {
            points: vec![
                point("A", 1e10, 1e-12),
                point("B", 1e15, 1e-11),
                point("A", 1e20, 1e-12),
            ],
        }
    }

    fn model() -> ModelSpectrum {
        let flat = |level: f64| Spectrum::new(vec![8.0, 27.0], vec![level, level]);
        ModelSpectrum {
            total: flat(-11.0),
            components: vec![
                (Component::Synchrotron, flat(-11.5)),
                (Component::SelfCompton, flat(-11.5)),
                (Component::SecondOrderCompton, flat(-20.0)),
            ],
        }
    }

    #[test]
    fn default_bounds_follow_data() {
        let data = data();
        let best = model();
        let figure = SedFigure {
            data: &data,
            best: &best,
            envelope: None,
            residual: ResidualMode::Sigma,
            boundaries: None,
            lower_adjust_multiplier: 20.0,
            upper_adjust_multiplier: 15.0,
            title: None,
        };
        let ((x0, x1), (y0, y1)) = figure.bounds();
        assert!((x0 - 5e8f64.log10()).abs() < 1e-12);
        assert!((x1 - 28.0).abs() < 1e-12);
        assert!((y0 - (1e-12f64 / 20.0).log10()).abs() < 1e-9);
        assert!((y1 - (1.5e-10f64).log10()).abs() < 1e-9);

        let pinned = SedFigure {
            boundaries: Some([1e9, 1e20, 1e-14, 1e-9]),
            ..figure
        };
        assert_eq!(pinned.bounds().1, (-14.0, -9.0));
    }

    #[test]
    fn faint_second_order_component_is_hidden() {
        let data = data();
        let best = model();
        let figure = SedFigure {
            data: &data,
            best: &best,
            envelope: None,
            residual: ResidualMode::None,
            boundaries: None,
            lower_adjust_multiplier: 20.0,
            upper_adjust_multiplier: 15.0,
            title: None,
        };
        let shown: Vec<Component> = figure.visible_components(-14.0).into_iter().map(|(c, _)| c).collect();
        assert_eq!(shown, vec![Component::Synchrotron, Component::SelfCompton]);
        assert_eq!(figure.visible_components(-21.0).len(), 3);
    }

    #[test]
    fn instruments_keep_first_colour() {
        let data = data();
        let best = model();
        let figure = SedFigure {
            data: &data,
            best: &best,
            envelope: None,
            residual: ResidualMode::None,
            boundaries: None,
            lower_adjust_multiplier: 20.0,
            upper_adjust_multiplier: 15.0,
            title: None,
        };
        let colors = figure.instrument_colors();
        assert_eq!(colors["A"].0, tab10(1));
        assert_eq!(colors["B"].0, tab10(2));
    }

    /// Upper limit, frequency bins and a detection with no upper error bar
    /// sitting below the model.
    fn observed() -> SedData {
        let point = |instrument: &str, nu: f64, nu_err: (f64, f64), nufnu: f64, err: (f64, f64), upper_limit: bool| SedPoint {
            instrument: instrument.into(),
            nu,
            nu_err_low: nu_err.0,
            nu_err_high: nu_err.1,
            nufnu,
            err_low: err.0,
            err_high: err.1,
            upper_limit,
        };
        SedData {
            points: vec![
                point("Radio", 1e10, (2e9, 5e9), 1e-12, (1e-13, 1e-13), false),
                point("Optical", 1e15, (0.0, 0.0), 1e-11, (1e-12, 2e-12), false),
                point("XRT", 1e18, (0.0, 0.0), 4e-12, (1e-12, 0.0), true),
                point("XRT", 3e18, (0.0, 0.0), 5e-13, (1e-13, 0.0), false),
                point("Fermi", 1e24, (5e23, 5e24), 2e-12, (5e-13, 5e-13), false),
            ],
        }
    }

    fn band() -> Envelope {
        Envelope {
            log_freq: vec![8.0, 17.0, 27.0],
            lower: vec![-11.5; 3],
            upper: vec![-10.5; 3],
        }
    }

    #[test]
    fn publication_figure_renders_in_every_residual_mode() {
        let data = observed();
        let best = model();
        let envelope = band();
        for residual in [ResidualMode::None, ResidualMode::Sigma, ResidualMode::Delta] {
            let figure = SedFigure {
                data: &data,
                best: &best,
                envelope: Some(&envelope),
                residual,
                boundaries: None,
                lower_adjust_multiplier: 20.0,
                upper_adjust_multiplier: 15.0,
                title: Some("3C 279".into()),
            };
            let svg = crate::plots::render_svg(&figure).unwrap();
            assert!(svg.contains("<svg"), "{residual:?}");
        }
    }

    #[test]
    fn simple_sed_figures_render() {
        let data = observed();
        let best = model();

        let svg = crate::plots::render_svg(&ModelFigure {
            spectrum: &best.total,
            title: None,
            line: true,
            points: true,
        })
        .unwrap();
        assert!(svg.contains("<svg"));

        for adjust_scale in [true, false] {
            let svg = crate::plots::render_svg(&DataFigure {
                data: &data,
                title: Some("data".into()),
                adjust_scale,
                lower_adjust_multiplier: None,
                upper_adjust_multiplier: None,
            })
            .unwrap();
            assert!(svg.contains("<svg"));

            let svg = crate::plots::render_svg(&ModelAndDataFigure {
                model: &best.total,
                data: &data,
                title: None,
                adjust_scale,
                lower_adjust_multiplier: Some(20.0),
                upper_adjust_multiplier: Some(15.0),
                line: true,
                points: true,
            })
            .unwrap();
            assert!(svg.contains("<svg"));
        }
    }
}
