//! One-sigma figures: the envelope band, the individual model curves and
//! the residuals against the best fit.

use plotters::coord::Shift;
use plotters::prelude::*;

use super::sed::{draw_data_plain, draw_legend, draw_spectrum_line};
use super::{axis_range, clip, configure_log_mesh, padded_range, pow10_label, Chart2d, Figure, BAND_COLOR, BEST_COLOR};
use crate::config::EnvelopeMode;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::models::{SedData, Spectrum};
use crate::residuals::{scale_to_values, AbsoluteResidual};

fn band_title(mode: EnvelopeMode) -> String {
    match mode {
        EnvelopeMode::Both => "MCMC results with the range from models within 1 sigma".to_string(),
        m => format!("MCMC results with the range from {} models within 1 sigma", m.descriptor()),
    }
}

fn lines_title(mode: EnvelopeMode) -> String {
    match mode {
        EnvelopeMode::Both => "MCMC results with models within 1 sigma".to_string(),
        m => format!("MCMC results with {} models within 1 sigma", m.descriptor()),
    }
}

/// Axes shared by the band and line figures: log ν over the model and data,
/// log νFν scaled away from the data.
fn one_sigma_axes(data: &SedData, best: &Spectrum, lower: f64, upper: f64) -> ((f64, f64), (f64, f64)) {
    let x = padded_range(
        best.log_freq
            .iter()
            .copied()
            .chain(data.points.iter().map(|p| p.nu.log10())),
        0.02,
    );
    let log_flux: Vec<f64> = data.points.iter().map(|p| p.nufnu.log10()).collect();
    let y = if log_flux.is_empty() {
        padded_range(best.log_flux.iter().copied(), 0.1)
    } else {
        scale_to_values(&log_flux, Some(lower), Some(upper))
    };
    (x, y)
}

fn one_sigma_chart<'a, DB: DrawingBackend>(
    root: &'a DrawingArea<DB, Shift>,
    title: &str,
    x: (f64, f64),
    y: (f64, f64),
) -> Result<Chart2d<'a, DB>> {
    let mut chart = ChartBuilder::on(root)
        .margin(12)
        .caption(title, ("sans-serif", 26))
        .x_label_area_size(60)
        .y_label_area_size(100)
        .build_cartesian_2d(axis_range(x)?, axis_range(y)?)?;
    configure_log_mesh(&mut chart, Some("log ν"), "log νFν")?;
    Ok(chart)
}

/// Filled band between the envelope edges with the best fit and the data.
pub struct EnvelopeFigure<'a> {
    pub data: &'a SedData,
    pub best: &'a Spectrum,
    pub envelope: &'a Envelope,
    pub mode: EnvelopeMode,
    pub lower_adjust_multiplier: f64,
    pub upper_adjust_multiplier: f64,
    pub title: Option<String>,
}

impl Figure for EnvelopeFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let (x, y) = one_sigma_axes(
            self.data,
            self.best,
            self.lower_adjust_multiplier,
            self.upper_adjust_multiplier,
        );
        let title = self.title.clone().unwrap_or_else(|| band_title(self.mode));
        let mut chart = one_sigma_chart(root, &title, x, y)?;

        let area = clip(self.envelope.polygon(), x, y);
        if area.len() >= 3 {
            chart
                .draw_series(std::iter::once(Polygon::new(area, BAND_COLOR.mix(0.5).filled())))?
                .label("Within 1 sigma")
                .legend(|(lx, ly)| Rectangle::new([(lx, ly - 5), (lx + 20, ly + 5)], BAND_COLOR.mix(0.5).filled()));
        }
        draw_spectrum_line(&mut chart, self.best, x, y, BEST_COLOR.stroke_width(2), Some("Best model"))?;
        draw_data_plain(&mut chart, self.data, y.0)?;
        draw_legend(&mut chart, SeriesLabelPosition::UpperRight)?;
        Ok(())
    }
}

/// Every selected model drawn as its own translucent curve.
pub struct EnvelopeLinesFigure<'a> {
    pub data: &'a SedData,
    pub best: &'a Spectrum,
    pub spectra: &'a [Spectrum],
    pub mode: EnvelopeMode,
    pub lower_adjust_multiplier: f64,
    pub upper_adjust_multiplier: f64,
    pub title: Option<String>,
}

impl Figure for EnvelopeLinesFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let (x, y) = one_sigma_axes(
            self.data,
            self.best,
            self.lower_adjust_multiplier,
            self.upper_adjust_multiplier,
        );
        let title = self.title.clone().unwrap_or_else(|| lines_title(self.mode));
        let mut chart = one_sigma_chart(root, &title, x, y)?;

        for spectrum in self.spectra {
            chart.draw_series(LineSeries::new(clip(spectrum.points(), x, y), RED.mix(0.5)))?;
        }
        draw_spectrum_line(&mut chart, self.best, x, y, BEST_COLOR.stroke_width(2), Some("Best model"))?;
        draw_data_plain(&mut chart, self.data, y.0)?;
        draw_legend(&mut chart, SeriesLabelPosition::UpperRight)?;
        Ok(())
    }
}

/// Best fit minus data at each observed frequency, with the envelope
/// relative to the data shaded behind.
pub struct ResidualFigure<'a> {
    pub residuals: &'a [AbsoluteResidual],
    pub title: Option<String>,
}

impl Figure for ResidualFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<()> {
        let mut sorted: Vec<&AbsoluteResidual> = self.residuals.iter().filter(|r| r.nu > 0.0).collect();
        sorted.sort_by(|a, b| a.nu.total_cmp(&b.nu));

        let x = padded_range(sorted.iter().map(|r| r.nu.log10()), 0.05);
        let y = padded_range(
            sorted
                .iter()
                .flat_map(|r| [r.value - r.err, r.value + r.err, r.band_low, r.band_high, 0.0]),
            0.05,
        );

        let mut builder = ChartBuilder::on(root);
        builder.margin(12).x_label_area_size(60).y_label_area_size(110);
        if let Some(title) = &self.title {
            builder.caption(title, ("sans-serif", 26));
        }
        let mut chart = builder.build_cartesian_2d(axis_range(x)?, axis_range(y)?)?;
        chart
            .configure_mesh()
            .x_desc("Frequency ν (Hz)")
            .y_desc("Residual Energy Flux νFν (erg cm⁻² s⁻¹)")
            .x_label_formatter(&pow10_label)
            .y_label_formatter(&|v| format!("{v:.1e}"))
            .label_style(("sans-serif", 16))
            .draw()?;

        chart.draw_series(LineSeries::new(vec![(x.0, 0.0), (x.1, 0.0)], BLACK.mix(0.5)))?;

        let mut band: Vec<(f64, f64)> = sorted.iter().map(|r| (r.nu.log10(), r.band_high)).collect();
        band.extend(sorted.iter().rev().map(|r| (r.nu.log10(), r.band_low)));
        if band.len() >= 3 {
            chart.draw_series(std::iter::once(Polygon::new(band, BAND_COLOR.mix(0.5).filled())))?;
        }

        chart.draw_series(sorted.iter().map(|r| {
            let px = r.nu.log10();
            PathElement::new(vec![(px, r.value - r.err), (px, r.value + r.err)], BAND_COLOR.stroke_width(1))
        }))?;
        chart.draw_series(
            sorted
                .iter()
                .map(|r| Circle::new((r.nu.log10(), r.value), 3, BAND_COLOR.filled())),
        )?;
        Ok(())
    }
}
