use crate::error::{BlazarError, Result};

/// Piecewise-linear interpolation that extends the end segments outward.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl LinearInterpolator {
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(BlazarError::Interpolation("x and y of equal length"));
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(BlazarError::Interpolation("finite values"));
        }

        let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        // stable, so the first of several equal abscissae survives dedup
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs.dedup_by(|later, earlier| later.0 == earlier.0);

        if pairs.len() < 2 {
            return Err(BlazarError::Interpolation("at least two distinct x values"));
        }
        let (xs, ys) = pairs.into_iter().unzip();
        Ok(LinearInterpolator { xs, ys })
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        // index of the segment [i, i+1] bracketing x, clamped to the ends
        let i = self.xs.partition_point(|&xi| xi <= x).clamp(1, n - 1) - 1;
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}

/// Shorthand for a one-off resampling of `(xs, ys)` onto `grid`.
pub fn interpolate_onto(xs: &[f64], ys: &[f64], grid: &[f64]) -> Result<Vec<f64>> {
    Ok(LinearInterpolator::new(xs, ys)?.eval_many(grid))
}
