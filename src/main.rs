use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use ndarray::{Array1, Array2};

use blazar_mcmc_plots::chain::{best_fit, chi_squared, indices_within_1sigma, min_max_params_1sigma, BestFit, Chain};
use blazar_mcmc_plots::config::{Config, EnvelopeMode};
use blazar_mcmc_plots::data::read_sed_data;
use blazar_mcmc_plots::envelope::{compute_envelope, select_vectors, EnvelopeRun};
use blazar_mcmc_plots::models::{ModelSpectrum, ParameterSpace, SedData};
use blazar_mcmc_plots::plots::{
    save_figure, ChainFigure, ChiSquaredFigure, ChiSquaredKind, CornerFigure, DataFigure, EnvelopeFigure,
    EnvelopeLinesFigure, ModelAndDataFigure, ModelFigure, ResidualFigure, SedFigure,
};
use blazar_mcmc_plots::report::Summary;
use blazar_mcmc_plots::residuals::absolute_residuals;
use blazar_mcmc_plots::sed_model::{unique_stem, ExternalModel, ModelRunner};

/// Diagnostic plots for blazar SED MCMC runs.
#[derive(Parser)]
#[command(name = "blazar-plots", version, about)]
struct Cli {
    /// JSON run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides `output_dir` from the configuration
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publication SED figure with components, 1σ band and residuals
    Sed,
    /// 1σ envelope of the model around the best fit
    Envelope {
        #[arg(long, value_enum)]
        mode: Option<EnvelopeMode>,
        /// Also draw every selected model as a line
        #[arg(long)]
        lines: bool,
        #[arg(long)]
        max_lines: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Corner plot of the posterior
    Corner,
    /// Walker traces for every parameter
    Chain,
    /// χ² by step; all three kinds when none is given
    Chi2 {
        #[arg(long, value_enum)]
        kind: Option<ChiSquaredKind>,
    },
    /// Observed data, optionally with the best-fit model
    Data {
        #[arg(long)]
        with_model: bool,
    },
    /// Best fit minus data with the 1σ band
    Residuals,
    /// summary.json and best_params.csv
    Report,
    /// Everything above
    All,
}

/// Everything derived from the configuration, chain and data once.
struct Session {
    config: Config,
    space: ParameterSpace,
    data: SedData,
    chain: Chain,
    flat_samples: Array2<f64>,
    flat_log_prob: Array1<f64>,
    best: BestFit,
    sigma_indices: Vec<usize>,
}

impl Session {
    fn load(mut config: Config, output: Option<PathBuf>) -> Result<Self> {
        if let Some(output) = output {
            config.output_dir = output;
        }
        let space = config.parameter_space()?;
        let data = read_sed_data(&config.data_file)
            .with_context(|| format!("loading SED data from {}", config.data_file.display()))?;
        let chain = Chain::read_csv(&config.chain_file)
            .with_context(|| format!("loading chain from {}", config.chain_file.display()))?;
        if chain.dims() != space.dims() {
            bail!(
                "chain has {} parameters but the configuration leaves {} free ({})",
                chain.dims(),
                space.dims(),
                space.free_names().join(", ")
            );
        }

        let flat_samples = chain.get_flat_chain(config.discard)?;
        let flat_log_prob = chain.get_flat_log_prob(config.discard)?;
        let best = best_fit(&flat_log_prob, &flat_samples)?;
        let sigma_indices = indices_within_1sigma(&flat_log_prob, space.dims())?;
        info!(
            "best fit at sample {} with χ² = {:.3}",
            best.index,
            best.chi_squared()
        );

        Ok(Session {
            config,
            space,
            data,
            chain,
            flat_samples,
            flat_log_prob,
            best,
            sigma_indices,
        })
    }

    fn size(&self) -> (u32, u32) {
        (self.config.plot.width, self.config.plot.height)
    }

    fn labels(&self) -> Vec<String> {
        self.space.free_labels().into_iter().map(String::from).collect()
    }

    fn model(&self) -> Result<ExternalModel> {
        let work_dir = &self.config.model.work_dir;
        std::fs::create_dir_all(work_dir).with_context(|| format!("creating {}", work_dir.display()))?;
        Ok(ExternalModel::new(&self.config.model, self.config.redshift, self.space.clone()))
    }

    fn best_model(&self, model: &ExternalModel) -> Result<ModelSpectrum> {
        ModelRunner::new(model, &self.space)
            .run(&self.best.params, &unique_stem("best"))
            .context("running the model for the best fit")
    }

    fn envelope(
        &self,
        model: &ExternalModel,
        best: &ModelSpectrum,
        mode: EnvelopeMode,
        max_lines: usize,
        seed: Option<u64>,
    ) -> Result<EnvelopeRun> {
        let vectors = select_vectors(self.flat_samples.view(), &self.sigma_indices, mode, max_lines, seed)?;
        let runner = ModelRunner::new(model, &self.space);
        compute_envelope(&runner, &vectors, &best.total.log_freq, &unique_stem("envelope"))
            .context("computing the 1σ envelope")
    }

    fn plot_data(&self, with_model: Option<&ModelSpectrum>) -> Result<()> {
        let plot = &self.config.plot;
        let figure = DataFigure {
            data: &self.data,
            title: None,
            adjust_scale: true,
            lower_adjust_multiplier: Some(plot.lower_adjust_multiplier),
            upper_adjust_multiplier: Some(plot.upper_adjust_multiplier),
        };
        save_figure(&figure, &self.config.output_path("data"), self.size())?;

        if let Some(best) = with_model {
            let figure = ModelFigure {
                spectrum: &best.total,
                title: None,
                line: true,
                points: false,
            };
            save_figure(&figure, &self.config.output_path("model"), self.size())?;
            let figure = ModelAndDataFigure {
                model: &best.total,
                data: &self.data,
                title: None,
                adjust_scale: true,
                lower_adjust_multiplier: Some(plot.lower_adjust_multiplier),
                upper_adjust_multiplier: Some(plot.upper_adjust_multiplier),
                line: true,
                points: false,
            };
            save_figure(&figure, &self.config.output_path("model_and_data"), self.size())?;
        }
        Ok(())
    }

    fn plot_corner(&self) -> Result<()> {
        let (sigma_min, sigma_max) = min_max_params_1sigma(self.flat_samples.view(), &self.sigma_indices)?;
        let figure = CornerFigure {
            samples: self.flat_samples.view(),
            labels: self.labels(),
            best: &self.best.params,
            sigma_min: &sigma_min,
            sigma_max: &sigma_max,
            ranges: self.config.param_bounds.as_deref(),
            bins: 20,
        };
        let side = self.config.plot.width.max(self.config.plot.height).max(180 * self.space.dims() as u32);
        save_figure(&figure, &self.config.output_path("corner"), (side, side))?;
        Ok(())
    }

    fn plot_chain(&self) -> Result<()> {
        let samples = self.chain.get_chain(0)?;
        let figure = ChainFigure {
            chain: samples.view(),
            labels: self.labels(),
        };
        let height = self.config.plot.height.max(140 * self.space.dims() as u32);
        save_figure(&figure, &self.config.output_path("chain"), (self.config.plot.width, height))?;
        Ok(())
    }

    fn plot_chi_squared(&self, kinds: &[ChiSquaredKind]) -> Result<()> {
        let chi_sq = chi_squared(&self.chain.get_log_prob(self.config.discard)?);
        for &kind in kinds {
            let figure = ChiSquaredFigure {
                chi_squared: chi_sq.view(),
                kind,
                discard: self.config.discard,
                title: None,
            };
            save_figure(&figure, &self.config.output_path(kind.file_stem()), self.size())?;
        }
        Ok(())
    }

    fn plot_envelope(&self, best: &ModelSpectrum, run: &EnvelopeRun, mode: EnvelopeMode, lines: bool) -> Result<()> {
        let (band_stem, lines_stem) = match mode {
            EnvelopeMode::Extreme => ("plot_with_extreme_params", "plot_with_lines_extreme_params"),
            EnvelopeMode::Random => ("plot_with_random_params", "plot_with_lines_random_params"),
            EnvelopeMode::Both => ("plot_with_error", "plot_with_error_lines"),
        };
        // random selections produce too many primitives for SVG
        let path = |stem: &str| match mode {
            EnvelopeMode::Extreme => self.config.output_path(stem),
            _ => self.config.output_dir.join(format!("{stem}.png")),
        };

        let figure = EnvelopeFigure {
            data: &self.data,
            best: &best.total,
            envelope: &run.envelope,
            mode,
            lower_adjust_multiplier: 1.02,
            upper_adjust_multiplier: 1.02,
            title: None,
        };
        save_figure(&figure, &path(band_stem), self.size())?;

        if lines {
            let figure = EnvelopeLinesFigure {
                data: &self.data,
                best: &best.total,
                spectra: &run.spectra,
                mode,
                lower_adjust_multiplier: 1.02,
                upper_adjust_multiplier: 1.02,
                title: None,
            };
            save_figure(&figure, &path(lines_stem), self.size())?;
        }
        Ok(())
    }

    fn plot_sed(&self, best: &ModelSpectrum, run: &EnvelopeRun) -> Result<()> {
        let plot = &self.config.plot;
        let figure = SedFigure {
            data: &self.data,
            best,
            envelope: Some(&run.envelope),
            residual: plot.residual,
            boundaries: plot.boundaries,
            lower_adjust_multiplier: plot.lower_adjust_multiplier,
            upper_adjust_multiplier: plot.upper_adjust_multiplier,
            title: None,
        };
        save_figure(&figure, &self.config.output_path("user_plot_SED"), self.size())?;
        Ok(())
    }

    fn plot_residuals(&self, best: &ModelSpectrum, run: &EnvelopeRun) -> Result<()> {
        let residuals = absolute_residuals(&self.data, &best.total, &run.envelope)?;
        let figure = ResidualFigure {
            residuals: &residuals,
            title: None,
        };
        save_figure(&figure, &self.config.output_path("residuals"), self.size())?;
        Ok(())
    }

    fn report(&self) -> Result<Summary> {
        let (sigma_min, sigma_max) = min_max_params_1sigma(self.flat_samples.view(), &self.sigma_indices)?;
        let names = self.space.free_names().into_iter().map(String::from).collect();
        let summary = Summary::new(
            names,
            &self.best,
            &sigma_min,
            &sigma_max,
            self.flat_log_prob.len(),
            self.sigma_indices.len(),
        )?;
        std::fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating {}", self.config.output_dir.display()))?;
        summary.write_json(&self.config.output_dir.join("summary.json"))?;
        summary.write_csv(&self.config.output_dir.join("best_params.csv"))?;
        Ok(summary)
    }
}

fn print_summary(summary: &Summary) {
    println!("-----------------------------------");
    println!("Best fit");
    println!("-----------------------------------");
    println!("  log prob     : {:.3}", summary.best_log_prob);
    println!("  χ²           : {:.3}", summary.best_chi_squared);
    println!("  samples      : {}", summary.n_samples);
    println!("  within 1σ    : {}", summary.n_within_1sigma);
    println!();
    for (i, name) in summary.param_names.iter().enumerate() {
        println!(
            "  {:<12} : {:.3} (+{:.3}/-{:.3})",
            name, summary.best_params[i], summary.sigma_above[i], summary.sigma_below[i]
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let session = Session::load(config, cli.output)?;
    let envelope_config = session.config.envelope.clone();

    match cli.command {
        Command::Sed => {
            let model = session.model()?;
            let best = session.best_model(&model)?;
            let run = session.envelope(&model, &best, envelope_config.mode, envelope_config.max_lines, envelope_config.seed)?;
            session.plot_sed(&best, &run)?;
        }
        Command::Envelope {
            mode,
            lines,
            max_lines,
            seed,
        } => {
            let mode = mode.unwrap_or(envelope_config.mode);
            let model = session.model()?;
            let best = session.best_model(&model)?;
            let run = session.envelope(
                &model,
                &best,
                mode,
                max_lines.unwrap_or(envelope_config.max_lines),
                seed.or(envelope_config.seed),
            )?;
            session.plot_envelope(&best, &run, mode, lines)?;
        }
        Command::Corner => session.plot_corner()?,
        Command::Chain => session.plot_chain()?,
        Command::Chi2 { kind } => match kind {
            Some(kind) => session.plot_chi_squared(&[kind])?,
            None => session.plot_chi_squared(&ChiSquaredKind::ALL)?,
        },
        Command::Data { with_model } => {
            if with_model {
                let model = session.model()?;
                let best = session.best_model(&model)?;
                session.plot_data(Some(&best))?;
            } else {
                session.plot_data(None)?;
            }
        }
        Command::Residuals => {
            let model = session.model()?;
            let best = session.best_model(&model)?;
            let run = session.envelope(&model, &best, envelope_config.mode, envelope_config.max_lines, envelope_config.seed)?;
            session.plot_residuals(&best, &run)?;
        }
        Command::Report => print_summary(&session.report()?),
        Command::All => {
            print_summary(&session.report()?);
            session.plot_corner()?;
            session.plot_chain()?;
            session.plot_chi_squared(&ChiSquaredKind::ALL)?;

            let model = session.model()?;
            let best = session.best_model(&model)?;
            session.plot_data(Some(&best))?;
            let mode = envelope_config.mode;
            let run = session.envelope(&model, &best, mode, envelope_config.max_lines, envelope_config.seed)?;
            session.plot_envelope(&best, &run, mode, true)?;
            session.plot_residuals(&best, &run)?;
            session.plot_sed(&best, &run)?;
        }
    }
    info!("done");
    Ok(())
}
