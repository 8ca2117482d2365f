use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlazarError, Result};
use crate::models::ParameterSpace;

/// Which 1-sigma parameter vectors feed the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeMode {
    /// Per-dimension minimum and maximum samples.
    #[default]
    Extreme,
    /// A random subsample of the unique 1-sigma samples.
    Random,
    /// Extreme vectors followed by the random subsample.
    Both,
}

impl EnvelopeMode {
    pub fn uses_extreme(self) -> bool {
        matches!(self, EnvelopeMode::Extreme | EnvelopeMode::Both)
    }

    pub fn uses_random(self) -> bool {
        matches!(self, EnvelopeMode::Random | EnvelopeMode::Both)
    }

    /// Word used in figure titles and file names; empty for `Both`.
    pub fn descriptor(self) -> &'static str {
        match self {
            EnvelopeMode::Extreme => "extreme",
            EnvelopeMode::Random => "random",
            EnvelopeMode::Both => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResidualMode {
    None,
    /// Distance from the model in units of the data error.
    #[default]
    Sigma,
    /// Fractional difference `data / model - 1`.
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub executable: PathBuf,
    /// Directory the executable runs in and writes its `.dat` files to.
    pub work_dir: PathBuf,
    /// Viewing angle, degrees.
    pub theta: f64,
    /// log10 Hz
    pub min_freq: f64,
    /// log10 Hz
    pub max_freq: f64,
    pub num_points: usize,
    pub extra_args: Vec<String>,
    pub keep_files: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            executable: PathBuf::from("bin/bj02"),
            work_dir: PathBuf::from("sed_calculations"),
            theta: 0.57,
            min_freq: 7.5,
            max_freq: 26.0,
            num_points: 99,
            extra_args: Vec::new(),
            keep_files: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub mode: EnvelopeMode,
    pub max_lines: usize,
    pub seed: Option<u64>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig {
            mode: EnvelopeMode::Extreme,
            max_lines: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub image_format: ImageFormat,
    pub residual: ResidualMode,
    /// `[nu_min, nu_max, nufnu_min, nufnu_max]` in Hz and erg cm^-2 s^-1.
    pub boundaries: Option<[f64; 4]>,
    pub lower_adjust_multiplier: f64,
    pub upper_adjust_multiplier: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            image_format: ImageFormat::Svg,
            residual: ResidualMode::Sigma,
            boundaries: None,
            lower_adjust_multiplier: 20.0,
            upper_adjust_multiplier: 15.0,
            width: 1200,
            height: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_file: PathBuf,
    pub chain_file: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub redshift: f64,
    #[serde(default)]
    pub discard: usize,
    #[serde(default)]
    pub eic: bool,
    /// One entry per model parameter, `null` for free ones.
    #[serde(default)]
    pub fixed_params: Vec<Option<f64>>,
    /// Corner plot ranges, one `[min, max]` per free parameter.
    #[serde(default)]
    pub param_bounds: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub plot: PlotConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("plots")
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| BlazarError::io(path, e))?;
        let mut config: Config = serde_json::from_str(&text).map_err(|e| BlazarError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new("")))?;
        config.validate()?;
        Ok(config)
    }

    /// Make every path absolute, reading relative ones against `base` (the
    /// config file's directory, which may itself be relative or empty).
    /// The model runs inside its work directory, so nothing may stay relative.
    pub fn resolve_paths(&mut self, base: &Path) -> Result<()> {
        let resolve = |p: &mut PathBuf| -> Result<()> {
            let joined = base.join(&*p);
            *p = std::path::absolute(&joined).map_err(|e| BlazarError::io(joined, e))?;
            Ok(())
        };
        resolve(&mut self.data_file)?;
        resolve(&mut self.chain_file)?;
        resolve(&mut self.output_dir)?;
        resolve(&mut self.model.work_dir)?;
        // bare command names are looked up on PATH
        if self.model.executable.components().count() > 1 {
            resolve(&mut self.model.executable)?;
        }
        Ok(())
    }

    pub fn parameter_space(&self) -> Result<ParameterSpace> {
        ParameterSpace::new(self.eic, &self.fixed_params)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(BlazarError::Config(msg));

        if !(self.redshift.is_finite() && self.redshift >= 0.0) {
            return fail(format!("redshift {} must be non-negative", self.redshift));
        }
        let space = self.parameter_space()?;
        if self.envelope.max_lines == 0 {
            return fail("envelope.max_lines must be at least 1".into());
        }
        if self.model.num_points < 2 {
            return fail("model.num_points must be at least 2".into());
        }
        if !(self.model.min_freq < self.model.max_freq) {
            return fail(format!(
                "model.min_freq {} must be below max_freq {}",
                self.model.min_freq, self.model.max_freq
            ));
        }
        if let Some(bounds) = &self.param_bounds {
            if bounds.len() != space.dims() {
                return fail(format!(
                    "param_bounds has {} entries for {} free parameters",
                    bounds.len(),
                    space.dims()
                ));
            }
            if let Some((i, b)) = bounds.iter().enumerate().find(|(_, b)| !(b[0] < b[1])) {
                return fail(format!("param_bounds[{i}] = {b:?} is not an increasing range"));
            }
        }
        if let Some(b) = &self.plot.boundaries {
            let ok = b.iter().all(|v| v.is_finite() && *v > 0.0) && b[0] < b[1] && b[2] < b[3];
            if !ok {
                return fail(format!("plot.boundaries {b:?} must be positive increasing pairs"));
            }
        }
        if self.plot.width == 0 || self.plot.height == 0 {
            return fail("plot width and height must be positive".into());
        }
        Ok(())
    }

    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.output_dir
            .join(format!("{stem}.{}", self.plot.image_format.extension()))
    }
}
