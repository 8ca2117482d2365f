use std::io::Write;
use std::sync::Mutex;

use approx::assert_relative_eq;
use blazar_mcmc_plots::chain::{best_fit, indices_within_1sigma, min_max_params_1sigma, Chain};
use blazar_mcmc_plots::config::EnvelopeMode;
use blazar_mcmc_plots::data::read_sed_data;
use blazar_mcmc_plots::envelope::{compute_envelope, select_vectors};
use blazar_mcmc_plots::models::{Component, ModelSpectrum, ParameterSpace, Spectrum};
use blazar_mcmc_plots::report::Summary;
use blazar_mcmc_plots::residuals::sigma_residuals;
use blazar_mcmc_plots::sed_model::{ModelRunner, SpectrumModel};
use blazar_mcmc_plots::{BlazarError, Result};

const CHAIN_CSV: &str = "\
step,walker,log_prob,delta,K
0,0,-10,5,5
0,1,-0.5,0.5,0.1
0,2,-3,-2,0
1,0,0,0,0
1,1,-1,-0.3,-0.2
1,2,-0.2,0.1,0.3
";

/// `log νFν = -12 + a + b (log ν - 12)` on three frequencies, where `a` and
/// `b` are the first two full parameters.
struct LinearSpectrum {
    stems: Mutex<Vec<String>>,
    fail_above: Option<f64>,
}

impl LinearSpectrum {
    fn new() -> Self {
        LinearSpectrum {
            stems: Mutex::new(Vec::new()),
            fail_above: None,
        }
    }
}

impl SpectrumModel for LinearSpectrum {
    fn compute(&self, full_params: &[f64], name_stem: &str) -> Result<ModelSpectrum> {
        self.stems.lock().unwrap().push(name_stem.to_string());
        let (a, b) = (full_params[0], full_params[1]);
        if self.fail_above.is_some_and(|limit| a > limit) {
            return Err(BlazarError::ModelOutput {
                path: name_stem.into(),
                reason: "refused".into(),
            });
        }
        let log_freq = vec![10.0, 12.0, 14.0];
        let log_flux = log_freq.iter().map(|x| -12.0 + a + b * (x - 12.0)).collect();
        let total = Spectrum::new(log_freq, log_flux);
        Ok(ModelSpectrum {
            components: vec![(Component::Synchrotron, total.clone())],
            total,
        })
    }
}

fn two_free_params() -> ParameterSpace {
    let mut fixed = vec![Some(1.0); 9];
    fixed[0] = None;
    fixed[1] = None;
    ParameterSpace::new(false, &fixed).unwrap()
}

fn chain() -> Chain {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CHAIN_CSV.as_bytes()).unwrap();
    Chain::read_csv(file.path()).unwrap()
}

#[test]
fn chain_selects_best_and_sigma_set() {
    let chain = chain();
    assert_eq!((chain.steps(), chain.walkers(), chain.dims()), (2, 3, 2));
    assert_eq!(chain.param_names(), &["delta".to_string(), "K".to_string()]);

    let flat = chain.get_flat_chain(0).unwrap();
    let lp = chain.get_flat_log_prob(0).unwrap();
    let best = best_fit(&lp, &flat).unwrap();
    assert_eq!(best.index, 3);
    assert_eq!(best.params, vec![0.0, 0.0]);

    let indices = indices_within_1sigma(&lp, 2).unwrap();
    assert_eq!(indices, vec![1, 3, 4, 5]);

    let (mins, maxs) = min_max_params_1sigma(flat.view(), &indices).unwrap();
    assert_eq!(mins, vec![-0.3, -0.2]);
    assert_eq!(maxs, vec![0.5, 0.3]);

    let summary = Summary::new(vec!["delta".into(), "K".into()], &best, &mins, &maxs, lp.len(), indices.len()).unwrap();
    assert_relative_eq!(summary.sigma_below[0], 0.3);
    assert_relative_eq!(summary.sigma_above[1], 0.3);
    assert_eq!(summary.n_within_1sigma, 4);
}

#[test]
fn extreme_envelope_bounds_selected_models() {
    let chain = chain();
    let flat = chain.get_flat_chain(0).unwrap();
    let lp = chain.get_flat_log_prob(0).unwrap();
    let best = best_fit(&lp, &flat).unwrap();
    let indices = indices_within_1sigma(&lp, 2).unwrap();

    let space = two_free_params();
    let model = LinearSpectrum::new();
    let runner = ModelRunner::new(&model, &space);
    let best_model = runner.run(&best.params, "best").unwrap();

    let vectors = select_vectors(flat.view(), &indices, EnvelopeMode::Extreme, 1000, None).unwrap();
    assert_eq!(vectors.len(), 4);
    let run = compute_envelope(&runner, &vectors, &best_model.total.log_freq, "env").unwrap();

    let expected_lower = [-12.5, -12.3, -12.7];
    let expected_upper = [-11.7, -11.5, -11.3];
    for j in 0..3 {
        assert_relative_eq!(run.envelope.lower[j], expected_lower[j], epsilon = 1e-12);
        assert_relative_eq!(run.envelope.upper[j], expected_upper[j], epsilon = 1e-12);
        assert!(run.envelope.lower[j] <= best_model.total.log_flux[j]);
        assert!(run.envelope.upper[j] >= best_model.total.log_flux[j]);
    }
    assert_eq!(run.spectra.len(), 4);

    let mut stems = model.stems.lock().unwrap().clone();
    stems.sort();
    stems.dedup();
    assert_eq!(stems.len(), 5);
    assert!(stems.contains(&"env_00003".to_string()));
}

#[test]
fn random_envelope_is_reproducible() {
    let chain = chain();
    let flat = chain.get_flat_chain(0).unwrap();
    let lp = chain.get_flat_log_prob(0).unwrap();
    let indices = indices_within_1sigma(&lp, 2).unwrap();

    let a = select_vectors(flat.view(), &indices, EnvelopeMode::Random, 2, Some(11)).unwrap();
    let b = select_vectors(flat.view(), &indices, EnvelopeMode::Random, 2, Some(11)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 2);
    for v in &a {
        assert!(indices.iter().any(|&i| flat.row(i).to_vec() == *v));
    }
}

#[test]
fn failing_model_aborts_envelope() {
    let chain = chain();
    let flat = chain.get_flat_chain(0).unwrap();
    let lp = chain.get_flat_log_prob(0).unwrap();
    let indices = indices_within_1sigma(&lp, 2).unwrap();

    let space = two_free_params();
    let model = LinearSpectrum {
        stems: Mutex::new(Vec::new()),
        fail_above: Some(0.4),
    };
    let runner = ModelRunner::new(&model, &space);
    let vectors = select_vectors(flat.view(), &indices, EnvelopeMode::Extreme, 10, None).unwrap();
    let err = compute_envelope(&runner, &vectors, &[10.0, 12.0, 14.0], "env").unwrap_err();
    assert!(matches!(err, BlazarError::ModelOutput { .. }));
}

#[test]
fn discard_beyond_chain_is_rejected() {
    let chain = chain();
    assert!(chain.get_flat_chain(2).is_err());
    assert_eq!(chain.get_flat_chain(1).unwrap().nrows(), 3);
}

#[test]
fn residuals_against_data_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"instrument,nu,nu_err_low,nu_err_high,nufnu,err_low,err_high\n\
          Radio,1e12,0,0,2e-12,1e-12,1e-12\n\
          Radio,1e12,0,0,5e-13,1e-12,2.5e-13\n\
          XRT,1e18,0,0,4e-12,0,1e-12\n",
    )
    .unwrap();
    let data = read_sed_data(file.path()).unwrap();
    assert!(data.points[2].upper_limit);

    let best = Spectrum::new(vec![8.0, 20.0], vec![-12.0, -12.0]);
    let residuals = sigma_residuals(&data, &best).unwrap();
    assert_eq!(residuals.len(), 2);
    assert_relative_eq!(residuals[0].value, 1.0, epsilon = 1e-9);
    assert_relative_eq!(residuals[1].value, -2.0, epsilon = 1e-9);
}
