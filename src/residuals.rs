use crate::envelope::Envelope;
use crate::error::Result;
use crate::interp::LinearInterpolator;
use crate::models::{SedData, SedPoint, Spectrum};

/// Best-fit model evaluated in linear frequency/flux, extrapolating past
/// the computed range.
pub struct LinearModel {
    best: LinearInterpolator,
}

impl LinearModel {
    pub fn new(best: &Spectrum) -> Result<Self> {
        Ok(LinearModel {
            best: LinearInterpolator::new(&best.freq(), &best.flux())?,
        })
    }

    pub fn flux_at(&self, nu: f64) -> f64 {
        self.best.eval(nu)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualPoint {
    pub instrument: String,
    pub nu: f64,
    pub value: f64,
    pub err_low: f64,
    pub err_high: f64,
}

/// Data-minus-model distance in units of the data error bar facing the
/// model. Upper limits and points without an upper error bar are dropped;
/// error bars are ±1.
pub fn sigma_residuals(data: &SedData, best: &Spectrum) -> Result<Vec<ResidualPoint>> {
    let model = LinearModel::new(best)?;
    Ok(data
        .detections()
        .filter(|p| p.err_high != 0.0)
        .map(|p| {
            let m = model.flux_at(p.nu);
            ResidualPoint {
                instrument: p.instrument.clone(),
                nu: p.nu,
                value: sigma_distance(p, m),
                err_low: 1.0,
                err_high: 1.0,
            }
        })
        .collect())
}

fn sigma_distance(p: &SedPoint, model_flux: f64) -> f64 {
    if p.nufnu > model_flux {
        (p.nufnu - model_flux) / p.err_low
    } else {
        -(model_flux - p.nufnu) / p.err_high
    }
}

/// Fractional residuals `data / model - 1` with errors scaled by the model,
/// upper limits included.
pub fn delta_residuals(data: &SedData, best: &Spectrum) -> Result<Vec<ResidualPoint>> {
    let model = LinearModel::new(best)?;
    Ok(data
        .points
        .iter()
        .map(|p| {
            let m = model.flux_at(p.nu);
            ResidualPoint {
                instrument: p.instrument.clone(),
                nu: p.nu,
                value: p.nufnu / m - 1.0,
                err_low: p.err_low / m,
                err_high: p.err_high / m,
            }
        })
        .collect())
}

/// Band of the envelope relative to the best fit along the model grid:
/// `(nu, 1 - best/low, high/best - 1)`.
pub fn delta_band(best: &Spectrum, envelope: &Envelope) -> Result<Vec<(f64, f64, f64)>> {
    let model = LinearModel::new(best)?;
    Ok(envelope
        .finite_points()
        .map(|(log_nu, lo, hi)| {
            let nu = 10f64.powf(log_nu);
            let m = model.flux_at(nu);
            (nu, 1.0 - m / 10f64.powf(lo), 10f64.powf(hi) / m - 1.0)
        })
        .collect())
}

/// Absolute residuals `model - data` at each data frequency together with
/// the envelope edges relative to the data.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsoluteResidual {
    pub nu: f64,
    pub value: f64,
    pub err: f64,
    pub band_low: f64,
    pub band_high: f64,
}

pub fn absolute_residuals(data: &SedData, best: &Spectrum, envelope: &Envelope) -> Result<Vec<AbsoluteResidual>> {
    let model = LinearModel::new(best)?;
    let edges: Vec<(f64, f64, f64)> = envelope.finite_points().collect();
    let nu: Vec<f64> = edges.iter().map(|(x, _, _)| 10f64.powf(*x)).collect();
    let low = LinearInterpolator::new(&nu, &edges.iter().map(|(_, lo, _)| 10f64.powf(*lo)).collect::<Vec<_>>())?;
    let high = LinearInterpolator::new(&nu, &edges.iter().map(|(_, _, hi)| 10f64.powf(*hi)).collect::<Vec<_>>())?;

    Ok(data
        .points
        .iter()
        .map(|p| AbsoluteResidual {
            nu: p.nu,
            value: model.flux_at(p.nu) - p.nufnu,
            err: p.err_low,
            band_low: low.eval(p.nu) - p.nufnu,
            band_high: high.eval(p.nu) - p.nufnu,
        })
        .collect())
}

/// Axis limits scaled away from the data range.
///
/// The minimum is pushed down by `lower` (multiplied if negative, divided
/// otherwise) and the maximum pushed up by `upper` the same way. Both
/// multipliers default to 5.
pub fn scale_to_values(values: &[f64], lower: Option<f64>, upper: Option<f64>) -> (f64, f64) {
    let lower = lower.unwrap_or(5.0);
    let upper = upper.unwrap_or(5.0);
    let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let new_min = if data_min < 0.0 { lower * data_min } else { data_min / lower };
    let new_max = if data_max < 0.0 { data_max / upper } else { upper * data_max };
    (new_min, new_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_model(level: f64) -> Spectrum {
        Spectrum::new(vec![8.0, 20.0], vec![level.log10(), level.log10()])
    }

    fn point(nufnu: f64, err_low: f64, err_high: f64, upper_limit: bool) -> SedPoint {
        SedPoint {
            instrument: "X".into(),
            nu: 1e12,
            nu_err_low: 0.0,
            nu_err_high: 0.0,
            nufnu,
            err_low,
            err_high,
            upper_limit,
        }
    }

    #[test]
    fn sigma_uses_error_facing_model() {
        let data = SedData {
            points: vec![
                point(3e-12, 1e-12, 4e-12, false),
                point(1e-12, 4e-12, 0.5e-12, false),
                point(9e-12, 1e-12, 1e-12, true),
            ],
        };
        let res = sigma_residuals(&data, &flat_model(2e-12)).unwrap();
        assert_eq!(res.len(), 2);
        assert_relative_eq!(res[0].value, 1.0, epsilon = 1e-9);
        assert_relative_eq!(res[1].value, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn sigma_skips_points_without_upper_error() {
        let data = SedData {
            points: vec![
                point(5e-13, 1e-13, 0.0, false),
                point(3e-12, 1e-12, 0.0, false),
                point(1e-12, 1e-13, 1e-12, false),
            ],
        };
        let res = sigma_residuals(&data, &flat_model(1e-12)).unwrap();
        assert_eq!(res.len(), 1);
        assert!(res.iter().all(|r| r.value.is_finite()));
        assert_relative_eq!(res[0].value, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn delta_is_fractional() {
        let data = SedData {
            points: vec![point(3e-12, 1e-12, 2e-12, false)],
        };
        let res = delta_residuals(&data, &flat_model(2e-12)).unwrap();
        assert_relative_eq!(res[0].value, 0.5, epsilon = 1e-9);
        assert_relative_eq!(res[0].err_high, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn delta_keeps_upper_limits() {
        let data = SedData {
            points: vec![point(3e-12, 1e-12, 2e-12, false), point(1e-12, 0.25e-12, 0.0, true)],
        };
        let res = delta_residuals(&data, &flat_model(2e-12)).unwrap();
        assert_eq!(res.len(), 2);
        assert_relative_eq!(res[1].value, -0.5, epsilon = 1e-9);
        assert_eq!(res[1].err_high, 0.0);
    }

    #[test]
    fn delta_band_brackets_zero() {
        let best = flat_model(2e-12);
        let envelope = Envelope {
            log_freq: vec![10.0, 12.0],
            lower: vec![1e-12f64.log10(); 2],
            upper: vec![4e-12f64.log10(); 2],
        };
        let band = delta_band(&best, &envelope).unwrap();
        assert_relative_eq!(band[0].1, -1.0, epsilon = 1e-9);
        assert_relative_eq!(band[0].2, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn absolute_residuals_relative_to_data() {
        let data = SedData {
            points: vec![point(3e-12, 1e-12, 1e-12, false)],
        };
        let envelope = Envelope {
            log_freq: vec![10.0, 14.0],
            lower: vec![1e-12f64.log10(); 2],
            upper: vec![5e-12f64.log10(); 2],
        };
        let res = absolute_residuals(&data, &flat_model(2e-12), &envelope).unwrap();
        assert_relative_eq!(res[0].value, -1e-12, epsilon = 1e-20);
        assert_relative_eq!(res[0].band_low, -2e-12, epsilon = 1e-20);
        assert_relative_eq!(res[0].band_high, 2e-12, epsilon = 1e-20);
    }

    #[test]
    fn scale_to_values_matches_sign_rules() {
        assert_eq!(scale_to_values(&[2.0, 10.0], None, None), (0.4, 50.0));
        assert_eq!(scale_to_values(&[-2.0, -1.0], Some(2.0), Some(4.0)), (-4.0, -0.25));
    }
}
