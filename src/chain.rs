use std::path::Path;

use log::{info, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::{BlazarError, Result};

/// Probability mass inside one sigma of a normal distribution.
pub const ONE_SIGMA_PROB: f64 = 0.6827;

/// Posterior samples of an ensemble sampler, exported step by step.
#[derive(Debug, Clone)]
pub struct Chain {
    /// steps × walkers × dims
    samples: Array3<f64>,
    /// steps × walkers
    log_prob: Array2<f64>,
    param_names: Vec<String>,
}

impl Chain {
    pub fn new(samples: Array3<f64>, log_prob: Array2<f64>, param_names: Vec<String>) -> Result<Self> {
        let (steps, walkers, dims) = samples.dim();
        if log_prob.dim() != (steps, walkers) {
            return Err(BlazarError::Chain(format!(
                "log_prob shape {:?} does not match chain shape ({steps}, {walkers})",
                log_prob.dim()
            )));
        }
        if param_names.len() != dims {
            return Err(BlazarError::Chain(format!(
                "{} parameter names for {dims} dimensions",
                param_names.len()
            )));
        }
        if steps == 0 || walkers == 0 || dims == 0 {
            return Err(BlazarError::Chain("chain is empty".into()));
        }
        Ok(Chain {
            samples,
            log_prob,
            param_names,
        })
    }

    /// Read a chain exported as `step,walker,log_prob,<param>...`.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| BlazarError::csv(path, e))?;

        let headers = reader.headers().map_err(|e| BlazarError::csv(path, e))?.clone();
        if headers.len() < 4 || &headers[0] != "step" || &headers[1] != "walker" || &headers[2] != "log_prob" {
            return Err(BlazarError::Chain(format!(
                "{}: header must start with step,walker,log_prob and name at least one parameter",
                path.display()
            )));
        }
        let param_names: Vec<String> = headers.iter().skip(3).map(str::to_string).collect();
        let dims = param_names.len();

        let mut rows: Vec<(usize, usize, f64, Vec<f64>)> = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| BlazarError::csv(path, e))?;
            let bad = |what: &str| BlazarError::Chain(format!("{} row {}: bad {what}", path.display(), line + 1));
            let step: usize = record[0].parse().map_err(|_| bad("step"))?;
            let walker: usize = record[1].parse().map_err(|_| bad("walker"))?;
            let lp: f64 = parse_float(&record[2]).ok_or_else(|| bad("log_prob"))?;
            let params = record
                .iter()
                .skip(3)
                .map(parse_float)
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| bad("parameter value"))?;
            if params.len() != dims {
                return Err(bad("column count"));
            }
            rows.push((step, walker, lp, params));
        }
        if rows.is_empty() {
            return Err(BlazarError::Chain(format!("{} has no samples", path.display())));
        }

        let steps = rows.iter().map(|r| r.0).max().unwrap_or(0) + 1;
        let walkers = rows.iter().map(|r| r.1).max().unwrap_or(0) + 1;
        if rows.len() != steps * walkers {
            return Err(BlazarError::Chain(format!(
                "{}: {} rows for {steps} steps × {walkers} walkers",
                path.display(),
                rows.len()
            )));
        }

        let mut samples = Array3::<f64>::from_elem((steps, walkers, dims), f64::NAN);
        let mut log_prob = Array2::<f64>::from_elem((steps, walkers), f64::NAN);
        let mut seen = Array2::<bool>::from_elem((steps, walkers), false);
        for (step, walker, lp, params) in rows {
            if seen[[step, walker]] {
                return Err(BlazarError::Chain(format!(
                    "{}: duplicate sample for step {step}, walker {walker}",
                    path.display()
                )));
            }
            seen[[step, walker]] = true;
            log_prob[[step, walker]] = lp;
            samples
                .slice_mut(s![step, walker, ..])
                .assign(&Array1::from(params));
        }

        info!(
            "Read chain {}: {steps} steps, {walkers} walkers, {dims} parameters",
            path.display()
        );
        Chain::new(samples, log_prob, param_names)
    }

    pub fn steps(&self) -> usize {
        self.samples.dim().0
    }

    pub fn walkers(&self) -> usize {
        self.samples.dim().1
    }

    pub fn dims(&self) -> usize {
        self.samples.dim().2
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn check_discard(&self, discard: usize) -> Result<()> {
        if discard >= self.steps() {
            return Err(BlazarError::Chain(format!(
                "discard {discard} leaves no samples from {} steps",
                self.steps()
            )));
        }
        Ok(())
    }

    pub fn get_chain(&self, discard: usize) -> Result<Array3<f64>> {
        self.check_discard(discard)?;
        Ok(self.samples.slice(s![discard.., .., ..]).to_owned())
    }

    /// Samples after burn-in, step-major: row `step * walkers + walker`.
    pub fn get_flat_chain(&self, discard: usize) -> Result<Array2<f64>> {
        let chain = self.get_chain(discard)?;
        let (steps, walkers, dims) = chain.dim();
        chain
            .into_shape_with_order((steps * walkers, dims))
            .map_err(|e| BlazarError::Chain(e.to_string()))
    }

    pub fn get_log_prob(&self, discard: usize) -> Result<Array2<f64>> {
        self.check_discard(discard)?;
        Ok(self.log_prob.slice(s![discard.., ..]).to_owned())
    }

    pub fn get_flat_log_prob(&self, discard: usize) -> Result<Array1<f64>> {
        let lp = self.get_log_prob(discard)?;
        Ok(lp.iter().copied().collect())
    }
}

fn parse_float(s: &str) -> Option<f64> {
    match s {
        "inf" | "+inf" | "Infinity" => Some(f64::INFINITY),
        "-inf" | "-Infinity" => Some(f64::NEG_INFINITY),
        "nan" | "NaN" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestFit {
    pub index: usize,
    pub log_prob: f64,
    pub params: Vec<f64>,
}

impl BestFit {
    pub fn chi_squared(&self) -> f64 {
        -2.0 * self.log_prob
    }
}

/// Sample with the highest log-probability; the first one wins ties.
pub fn best_fit(flat_log_prob: &Array1<f64>, flat_samples: &Array2<f64>) -> Result<BestFit> {
    if flat_log_prob.len() != flat_samples.nrows() {
        return Err(BlazarError::Chain(format!(
            "{} log-probabilities for {} samples",
            flat_log_prob.len(),
            flat_samples.nrows()
        )));
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, &lp) in flat_log_prob.iter().enumerate() {
        if !lp.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if lp <= b => {}
            _ => best = Some((i, lp)),
        }
    }
    let (index, log_prob) = best.ok_or_else(|| BlazarError::Chain("no finite log-probability".into()))?;
    Ok(BestFit {
        index,
        log_prob,
        params: flat_samples.row(index).to_vec(),
    })
}

/// Δχ² bounding the one-sigma region for `dims` jointly estimated parameters.
pub fn delta_chi_squared_1sigma(dims: usize) -> Result<f64> {
    let dist = ChiSquared::new(dims as f64)
        .map_err(|e| BlazarError::Chain(format!("chi-squared with {dims} dof: {e}")))?;
    Ok(dist.inverse_cdf(ONE_SIGMA_PROB))
}

/// Indices (ascending) of samples whose χ² lies within the one-sigma Δχ² of
/// the minimum. Non-finite log-probabilities are never included.
pub fn indices_within_1sigma(flat_log_prob: &Array1<f64>, dims: usize) -> Result<Vec<usize>> {
    let threshold = delta_chi_squared_1sigma(dims)?;
    let chi_sq: Vec<f64> = flat_log_prob.iter().map(|lp| -2.0 * lp).collect();
    let min_chi_sq = chi_sq
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !min_chi_sq.is_finite() {
        return Err(BlazarError::EmptySigmaSet);
    }
    let skipped = chi_sq.iter().filter(|c| !c.is_finite()).count();
    if skipped > 0 {
        warn!("{skipped} samples with non-finite log-probability ignored");
    }

    let indices: Vec<usize> = chi_sq
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_finite() && **c - min_chi_sq <= threshold)
        .map(|(i, _)| i)
        .collect();
    info!(
        "{} of {} samples within 1 sigma (Δχ² ≤ {threshold:.3} for {dims} dof)",
        indices.len(),
        chi_sq.len()
    );
    Ok(indices)
}

/// Per-dimension minimum and maximum over the one-sigma samples.
pub fn min_max_params_1sigma(flat_samples: ArrayView2<f64>, indices: &[usize]) -> Result<(Vec<f64>, Vec<f64>)> {
    if indices.is_empty() {
        return Err(BlazarError::EmptySigmaSet);
    }
    let subset = flat_samples.select(Axis(0), indices);
    let mins = subset
        .axis_iter(Axis(1))
        .map(|col| col.iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    let maxs = subset
        .axis_iter(Axis(1))
        .map(|col| col.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    Ok((mins, maxs))
}

/// χ² per step and walker.
pub fn chi_squared(log_prob: &Array2<f64>) -> Array2<f64> {
    log_prob.mapv(|lp| -2.0 * lp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn small_chain() -> Chain {
        // 3 steps, 2 walkers, 2 dims
        let samples = Array3::from_shape_vec(
            (3, 2, 2),
            vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0],
        )
        .unwrap();
        let log_prob = array![[-10.0, -9.0], [-3.0, -1.0], [-1.0, -2.0]];
        Chain::new(samples, log_prob, vec!["a".into(), "b".into()]).unwrap()
    }

    #[test]
    fn flat_chain_is_step_major() {
        let chain = small_chain();
        let flat = chain.get_flat_chain(1).unwrap();
        assert_eq!(flat.nrows(), 4);
        assert_eq!(flat.row(0).to_vec(), vec![2.0, 2.0]);
        assert_eq!(flat.row(3).to_vec(), vec![5.0, 5.0]);
        let lp = chain.get_flat_log_prob(1).unwrap();
        assert_eq!(lp.to_vec(), vec![-3.0, -1.0, -1.0, -2.0]);
    }

    #[test]
    fn discard_past_end_is_error() {
        assert!(small_chain().get_chain(3).is_err());
    }

    #[test]
    fn best_fit_takes_first_maximum() {
        let chain = small_chain();
        let flat = chain.get_flat_chain(0).unwrap();
        let lp = chain.get_flat_log_prob(0).unwrap();
        let best = best_fit(&lp, &flat).unwrap();
        assert_eq!(best.index, 3);
        assert_eq!(best.params, vec![3.0, 3.0]);
        assert_relative_eq!(best.chi_squared(), 2.0);
    }

    #[test]
    fn delta_chi_squared_matches_tables() {
        assert_relative_eq!(delta_chi_squared_1sigma(1).unwrap(), 1.0, epsilon = 2e-3);
        assert_relative_eq!(delta_chi_squared_1sigma(2).unwrap(), 2.30, epsilon = 1e-2);
    }

    #[test]
    fn sigma_indices_respect_threshold_and_skip_non_finite() {
        // 1 dof: Δχ² ≈ 1, i.e. Δlog_prob ≈ 0.5
        let lp = array![-1.0, -1.4, -1.6, f64::NEG_INFINITY, f64::NAN, -1.0];
        let idx = indices_within_1sigma(&lp, 1).unwrap();
        assert_eq!(idx, vec![0, 1, 5]);
    }

    #[test]
    fn sigma_ranges_per_dimension() {
        let flat = array![[0.0, 5.0], [1.0, 4.0], [9.0, -9.0], [2.0, 3.0]];
        let (mins, maxs) = min_max_params_1sigma(flat.view(), &[0, 1, 3]).unwrap();
        assert_eq!(mins, vec![0.0, 3.0]);
        assert_eq!(maxs, vec![2.0, 5.0]);
        assert!(min_max_params_1sigma(flat.view(), &[]).is_err());
    }
}
