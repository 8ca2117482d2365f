//! One-sigma envelope of model spectra.
//!
//! Parameter vectors are drawn from the posterior samples within one sigma
//! of the best fit, each is pushed through the emission model, and the
//! resulting spectra are resampled onto the best-fit frequency grid. The
//! band is the pointwise minimum and maximum across those curves.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use log::{debug, info};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::EnvelopeMode;
use crate::error::{BlazarError, Result};
use crate::interp::interpolate_onto;
use crate::models::{ModelSpectrum, Spectrum};
use crate::sed_model::{ModelRunner, SpectrumModel};

/// For each dimension, the 1-sigma sample with the smallest and the largest
/// value in that dimension.
///
/// Both lists have one vector per dimension. The first 1-sigma sample seeds
/// every slot and only a strictly smaller (larger) value replaces it, so ties
/// resolve to the earliest sample.
pub fn extremal_vectors(flat_samples: ArrayView2<f64>, indices: &[usize]) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    let first = *indices.first().ok_or(BlazarError::EmptySigmaSet)?;
    let dims = flat_samples.ncols();
    let seed = flat_samples.row(first).to_vec();
    let mut minima = vec![seed.clone(); dims];
    let mut maxima = vec![seed; dims];

    for &index in indices {
        let params = flat_samples.row(index);
        for i in 0..dims {
            if params[i] < minima[i][i] {
                minima[i] = params.to_vec();
            }
            if params[i] > maxima[i][i] {
                maxima[i] = params.to_vec();
            }
        }
    }
    Ok((minima, maxima))
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Distinct 1-sigma vectors in lexicographic order.
pub fn unique_samples(flat_samples: ArrayView2<f64>, indices: &[usize]) -> Vec<Vec<f64>> {
    let mut rows: Vec<Vec<f64>> = indices.iter().map(|&i| flat_samples.row(i).to_vec()).collect();
    rows.sort_by(|a, b| lexicographic(a, b));
    rows.dedup_by(|a, b| lexicographic(a, b).is_eq());
    rows
}

/// Up to `max_lines` distinct 1-sigma vectors, drawn without replacement.
///
/// The same seed and index set always produce the same subsample. Without
/// a seed the generator is seeded from the OS.
pub fn random_subsample(
    flat_samples: ArrayView2<f64>,
    indices: &[usize],
    max_lines: usize,
    seed: Option<u64>,
) -> Vec<Vec<f64>> {
    let samples = unique_samples(flat_samples, indices);
    let count = samples.len().min(max_lines);
    if count == samples.len() {
        return samples;
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    rand::seq::index::sample(&mut rng, samples.len(), count)
        .into_iter()
        .map(|i| samples[i].clone())
        .collect()
}

/// Parameter vectors to run through the model for the given mode.
pub fn select_vectors(
    flat_samples: ArrayView2<f64>,
    indices: &[usize],
    mode: EnvelopeMode,
    max_lines: usize,
    seed: Option<u64>,
) -> Result<Vec<Vec<f64>>> {
    if indices.is_empty() {
        return Err(BlazarError::EmptySigmaSet);
    }
    let mut selected = Vec::new();
    if mode.uses_extreme() {
        let (minima, maxima) = extremal_vectors(flat_samples, indices)?;
        selected.extend(minima);
        selected.extend(maxima);
    }
    if mode.uses_random() {
        selected.extend(random_subsample(flat_samples, indices, max_lines, seed));
    }
    if selected.is_empty() {
        return Err(BlazarError::EmptySelection);
    }
    info!("{} parameter vectors selected for the {:?} envelope", selected.len(), mode);
    Ok(selected)
}

/// Lower and upper bounds of a set of curves on a shared log-frequency grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub log_freq: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Envelope {
    /// An envelope no curve has touched yet: `+inf` below, `-inf` above.
    pub fn empty(grid: &[f64]) -> Self {
        Envelope {
            log_freq: grid.to_vec(),
            lower: vec![f64::INFINITY; grid.len()],
            upper: vec![f64::NEG_INFINITY; grid.len()],
        }
    }

    /// Widen the envelope to contain `values` (one per grid point).
    /// Non-finite values are ignored.
    pub fn include(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.log_freq.len() {
            return Err(BlazarError::DimensionMismatch {
                expected: self.log_freq.len(),
                found: values.len(),
            });
        }
        for (j, &v) in values.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            if v < self.lower[j] {
                self.lower[j] = v;
            }
            if v > self.upper[j] {
                self.upper[j] = v;
            }
        }
        Ok(())
    }

    /// Envelope spanned by `spectra` after resampling each onto `grid`.
    pub fn from_spectra<'a>(grid: &[f64], spectra: impl IntoIterator<Item = &'a Spectrum>) -> Result<Self> {
        let mut envelope = Envelope::empty(grid);
        for spectrum in spectra {
            envelope.include(&resample(spectrum, grid)?)?;
        }
        Ok(envelope)
    }

    /// Grid points at least one curve reached, as `(x, lower, upper)`.
    pub fn finite_points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.log_freq
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .filter(|(_, (lo, hi))| lo.is_finite() && hi.is_finite())
            .map(|(x, (lo, hi))| (*x, *lo, *hi))
    }

    /// Polygon outline of the band: upper edge left to right, lower edge back.
    pub fn polygon(&self) -> Vec<(f64, f64)> {
        let points: Vec<_> = self.finite_points().collect();
        let mut area: Vec<(f64, f64)> = points.iter().map(|(x, _, hi)| (*x, *hi)).collect();
        area.extend(points.iter().rev().map(|(x, lo, _)| (*x, *lo)));
        area
    }
}

/// `spectrum` interpolated (and extrapolated) onto `grid`.
pub fn resample(spectrum: &Spectrum, grid: &[f64]) -> Result<Vec<f64>> {
    interpolate_onto(&spectrum.log_freq, &spectrum.log_flux, grid)
}

/// Result of running the model over the selected vectors.
#[derive(Debug, Clone)]
pub struct EnvelopeRun {
    pub envelope: Envelope,
    pub spectra: Vec<Spectrum>,
}

/// Run the model for every vector in parallel and bound the results on
/// `grid`. Each run gets the stem `<stem>_<n>`; the first failure aborts.
pub fn compute_envelope<M: SpectrumModel + ?Sized>(
    runner: &ModelRunner<'_, M>,
    vectors: &[Vec<f64>],
    grid: &[f64],
    stem: &str,
) -> Result<EnvelopeRun> {
    if vectors.is_empty() {
        return Err(BlazarError::EmptySelection);
    }
    let done = AtomicUsize::new(0);
    let total = vectors.len();

    let spectra: Vec<Spectrum> = vectors
        .par_iter()
        .enumerate()
        .map(|(i, params)| {
            let model: ModelSpectrum = runner.run(params, &format!("{stem}_{i:05}"))?;
            let n = done.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            debug!("envelope model {n}/{total} done");
            Ok(model.total)
        })
        .collect::<Result<Vec<_>>>()?;

    let envelope = Envelope::from_spectra(grid, &spectra)?;
    info!("Envelope built from {} model spectra on {} grid points", spectra.len(), grid.len());
    Ok(EnvelopeRun { envelope, spectra })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn extremal_vectors_follow_documented_example() {
        let samples = array![[0.0, 1.0, 2.0], [5.0, 2.0, 1.0], [4.0, 6.0, 1.0], [3.0, 2.0, 0.0]];
        let (minima, maxima) = extremal_vectors(samples.view(), &[0, 1, 2, 3]).unwrap();
        assert_eq!(minima, vec![vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0], vec![3.0, 2.0, 0.0]]);
        assert_eq!(maxima, vec![vec![5.0, 2.0, 1.0], vec![4.0, 6.0, 1.0], vec![0.0, 1.0, 2.0]]);
    }

    #[test]
    fn extremal_ties_keep_first() {
        let samples = array![[9.0, 0.0], [1.0, 5.0], [1.0, 7.0], [2.0, 7.0]];
        let (minima, maxima) = extremal_vectors(samples.view(), &[1, 2, 3]).unwrap();
        assert_eq!(minima[0], vec![1.0, 5.0]);
        assert_eq!(maxima[1], vec![1.0, 7.0]);
    }

    #[test]
    fn extremal_vectors_only_use_sigma_set() {
        let samples = array![[-100.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let (minima, _) = extremal_vectors(samples.view(), &[1, 2]).unwrap();
        assert_eq!(minima[0], vec![1.0, 1.0]);
        assert!(extremal_vectors(samples.view(), &[]).is_err());
    }

    #[test]
    fn unique_samples_sorted_and_deduplicated() {
        let samples = array![[2.0, 1.0], [1.0, 3.0], [2.0, 1.0], [1.0, 2.0]];
        let unique = unique_samples(samples.view(), &[0, 1, 2, 3]);
        assert_eq!(unique, vec![vec![1.0, 2.0], vec![1.0, 3.0], vec![2.0, 1.0]]);
    }

    #[test]
    fn random_subsample_takes_all_when_small() {
        let samples = array![[1.0], [2.0], [1.0]];
        let picked = random_subsample(samples.view(), &[0, 1, 2], 10, Some(1));
        assert_eq!(picked, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn random_subsample_is_seeded() {
        let samples = ndarray::Array2::from_shape_fn((50, 2), |(i, j)| (i * 2 + j) as f64);
        let indices: Vec<usize> = (0..50).collect();
        let a = random_subsample(samples.view(), &indices, 10, Some(42));
        let b = random_subsample(samples.view(), &indices, 10, Some(42));
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_by(|x, y| lexicographic(x, y));
        sorted.dedup();
        assert_eq!(sorted.len(), 10);
    }

    #[test]
    fn select_vectors_orders_blocks() {
        let samples = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]];
        let both = select_vectors(samples.view(), &[0, 1, 2], EnvelopeMode::Both, 5, Some(3)).unwrap();
        // 2 minima + 2 maxima + 3 unique samples
        assert_eq!(both.len(), 7);
        assert_eq!(both[0], vec![0.0, 1.0]);
        assert_eq!(both[2], vec![1.0, 0.0]);
        let random = select_vectors(samples.view(), &[0, 1, 2], EnvelopeMode::Random, 2, Some(3)).unwrap();
        assert_eq!(random.len(), 2);
    }

    #[test]
    fn envelope_bounds_every_curve() {
        let grid = vec![0.0, 1.0, 2.0, 3.0];
        let spectra = vec![
            Spectrum::new(vec![0.0, 3.0], vec![0.0, 3.0]),
            Spectrum::new(vec![0.0, 1.0, 2.0], vec![2.0, 0.0, 2.0]),
            Spectrum::new(vec![1.0, 2.0], vec![-1.0, -1.0]),
        ];
        let envelope = Envelope::from_spectra(&grid, &spectra).unwrap();
        for s in &spectra {
            let curve = resample(s, &grid).unwrap();
            for j in 0..grid.len() {
                assert!(envelope.lower[j] <= curve[j]);
                assert!(envelope.upper[j] >= curve[j]);
            }
        }
        // second spectrum extrapolates to 4.0 at x = 3
        assert_eq!(envelope.upper[3], 4.0);
        assert_eq!(envelope.lower, vec![-1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn untouched_points_are_skipped_in_polygon() {
        let mut envelope = Envelope::empty(&[0.0, 1.0, 2.0]);
        envelope.include(&[1.0, f64::NAN, 3.0]).unwrap();
        envelope.include(&[2.0, f64::NAN, 1.0]).unwrap();
        assert_eq!(envelope.lower[1], f64::INFINITY);
        assert_eq!(envelope.polygon(), vec![(0.0, 2.0), (2.0, 3.0), (2.0, 1.0), (0.0, 1.0)]);
        assert!(envelope.include(&[1.0]).is_err());
    }
}
